//! Identifier types.
//!
//! A [`CellId`] is the partition key of a cell entity. It is a pair of
//! signed coordinates whose external form is `"{row}x{col}"`, i.e. `y`
//! first and `x` second. Parsing only accepts the canonical form produced
//! by [`Display`](core::fmt::Display), so the string mapping is bijective.
//!
//! [`EventId`] uniquely identifies one persisted event across regions and
//! is what replication uses to recognize an event it has already stored.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Errors produced when parsing a [`CellId`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellIdError {
    /// The input is not two integers separated by a single `x`.
    #[error("malformed cell id {0:?}: expected \"<row>x<col>\"")]
    Malformed(String),

    /// The input parsed but is not in canonical form (e.g. `"+1x02"`).
    #[error("non-canonical cell id {given:?}, expected {canonical:?}")]
    NonCanonical {
        /// The string as given.
        given: String,
        /// The canonical rendering of the same coordinates.
        canonical: String,
    },
}

/// Address of one cell on the unbounded grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl CellId {
    /// Build an id from column `x` and row `y`.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Return the cell displaced by `dx` columns and `dy` rows.
    ///
    /// Saturates at the edge of the `i32` coordinate space, so a step past
    /// `i32::MAX` or `i32::MIN` stays on the edge cell.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// The eight cells at Chebyshev distance 1, in row-major order.
    ///
    /// On the edge of the coordinate space the offsets saturate, so some
    /// entries repeat or equal `self`. Spreading to such an entry is a
    /// no-op because the cell has already been handled.
    pub const fn neighbors(self) -> [Self; 8] {
        [
            self.offset(-1, -1),
            self.offset(0, -1),
            self.offset(1, -1),
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(-1, 1),
            self.offset(0, 1),
            self.offset(1, 1),
        ]
    }

    /// Squared Euclidean distance to the point `(x, y)`.
    ///
    /// Computed in `i64` so it cannot overflow for any pair of `i32`
    /// coordinates.
    pub fn distance_squared_to(self, x: i32, y: i32) -> i64 {
        let dx = i64::from(self.x).saturating_sub(i64::from(x));
        let dy = i64::from(self.y).saturating_sub(i64::from(y));
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.y, self.x)
    }
}

impl FromStr for CellId {
    type Err = CellIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CellIdError::Malformed(s.to_owned());
        let (row, col) = s.split_once('x').ok_or_else(malformed)?;
        let y: i32 = row.parse().map_err(|_parse| malformed())?;
        let x: i32 = col.parse().map_err(|_parse| malformed())?;

        let id = Self { x, y };
        let canonical = id.to_string();
        if canonical != s {
            return Err(CellIdError::NonCanonical {
                given: s.to_owned(),
                canonical,
            });
        }
        Ok(id)
    }
}

impl Serialize for CellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Unique identifier of a persisted event (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new identifier using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_row_then_column() {
        assert_eq!(CellId::new(3, 2).to_string(), "2x3");
        assert_eq!(CellId::new(-7, -1).to_string(), "-1x-7");
    }

    #[test]
    fn parses_negative_coordinates() {
        let parsed: Result<CellId, _> = "-4x12".parse();
        assert_eq!(parsed, Ok(CellId::new(12, -4)));
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "12", "1x", "x1", "1x2x3", "ax1", "1 x 2", "1X2"] {
            assert!(
                matches!(bad.parse::<CellId>(), Err(CellIdError::Malformed(_))),
                "expected {bad:?} to be malformed"
            );
        }
    }

    #[test]
    fn rejects_non_canonical_ids() {
        let parsed = "+1x02".parse::<CellId>();
        assert!(matches!(parsed, Err(CellIdError::NonCanonical { .. })));
    }

    #[test]
    fn string_form_is_bijective_over_a_block() {
        for y in -3..=3 {
            for x in -3..=3 {
                let id = CellId::new(x, y);
                assert_eq!(id.to_string().parse::<CellId>(), Ok(id));
            }
        }
    }

    #[test]
    fn event_ids_are_version_7_and_time_ordered() {
        let first = EventId::new();
        let second = EventId::new();
        assert_eq!(first.into_inner().get_version_num(), 7);
        assert_ne!(first, second);
        assert!(first < second);
        assert_eq!(EventId::from(first.into_inner()), first);
    }

    #[test]
    fn neighbors_saturate_at_the_coordinate_edge() {
        let corner = CellId::new(i32::MAX, i32::MIN);
        let inner = corner.offset(-1, 1);
        assert_eq!(inner, CellId::new(2_147_483_646, -2_147_483_647));

        let neighbors = corner.neighbors();
        assert!(neighbors.contains(&corner));
        assert!(neighbors.contains(&inner));
        for n in neighbors {
            assert!(n.x >= inner.x && n.y <= inner.y);
        }
    }

    #[test]
    fn neighbors_are_the_eight_surrounding_cells() {
        let center = CellId::new(5, 5);
        let neighbors = center.neighbors();
        assert_eq!(neighbors.len(), 8);
        assert!(!neighbors.contains(&center));
        for n in neighbors {
            assert!(n.x.abs_diff(center.x) <= 1 && n.y.abs_diff(center.y) <= 1);
        }
        let mut unique = neighbors.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 8);
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&CellId::new(10, 5)).unwrap_or_default();
        assert_eq!(json, "\"5x10\"");
        let back: Result<CellId, _> = serde_json::from_str("\"5x10\"");
        assert_eq!(back.ok(), Some(CellId::new(10, 5)));
    }

    #[test]
    fn distance_squared_does_not_overflow() {
        let far = CellId::new(i32::MIN, i32::MIN);
        assert!(far.distance_squared_to(i32::MAX, i32::MAX) > 0);
    }
}
