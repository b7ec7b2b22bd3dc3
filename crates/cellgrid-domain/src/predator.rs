//! Predator pursuit.
//!
//! Given the predator's cell, a read-model snapshot of nearby cells and
//! the predator's remaining range, [`next_cell`] picks the adjacent cell
//! the predator steps onto next.
//!
//! The search runs in two passes:
//!
//! 1. **Short range** (radius `min(range, 10)`). Prey is ranked by
//!    intensity, then distance. If an adjacent cell holds prey of the best
//!    intensity, one of those cells is picked at random; otherwise the
//!    predator steps toward the nearest best-ranked prey.
//! 2. **Long range** (radius `range`). Every prey cell contributes a unit
//!    vector scaled by `intensity * exp(-d^2 / (2 sigma^2))`, and the
//!    predator steps along the sum.
//!
//! Rows that are stale or missing only make the predator less accurate;
//! an empty snapshot yields `None`, which the cell aggregate treats as
//! death.

use cellgrid_types::{CellId, CellRow};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;

use crate::geometry::within;

/// Radius of the short-range pass.
pub const SHORT_RANGE: i32 = 10;

/// Width of the long-range Gaussian falloff.
pub const SCENT_SIGMA: f64 = 20.0;

/// Scent contributions at or below this are dropped.
pub const MIN_SCENT: f64 = 0.000_001;

// ---------------------------------------------------------------------------
// Headings
// ---------------------------------------------------------------------------

/// One of the eight compass steps.
///
/// Increasing row index is north on this grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heading {
    /// Column + 1.
    East,
    /// Row + 1, column + 1.
    NorthEast,
    /// Row + 1.
    North,
    /// Row + 1, column - 1.
    NorthWest,
    /// Column - 1.
    West,
    /// Row - 1, column - 1.
    SouthWest,
    /// Row - 1.
    South,
    /// Row - 1, column + 1.
    SouthEast,
}

impl Heading {
    /// Headings in counter-clockwise order starting at 0 degrees.
    pub const COMPASS: [Self; 8] = [
        Self::East,
        Self::NorthEast,
        Self::North,
        Self::NorthWest,
        Self::West,
        Self::SouthWest,
        Self::South,
        Self::SouthEast,
    ];

    /// `(dx, dy)` step for this heading.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::East => (1, 0),
            Self::NorthEast => (1, 1),
            Self::North => (0, 1),
            Self::NorthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::SouthWest => (-1, -1),
            Self::South => (0, -1),
            Self::SouthEast => (1, -1),
        }
    }

    /// Quantize a direction vector to the nearest 45-degree heading.
    ///
    /// The zero vector maps to [`Heading::East`].
    pub fn from_vector(x: f64, y: f64) -> Self {
        let degrees = y.atan2(x).to_degrees();
        // round() is in [-4, 4]; rem_euclid folds it into [0, 8).
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let octant = (degrees / 45.0).round().rem_euclid(8.0) as usize;
        Self::COMPASS.get(octant).copied().unwrap_or(Self::East)
    }

    /// The cell one step from `from` in this heading.
    pub const fn step(self, from: CellId) -> CellId {
        let (dx, dy) = self.offset();
        from.offset(dx, dy)
    }
}

// ---------------------------------------------------------------------------
// Pursuit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Prey {
    id: CellId,
    intensity: u8,
    dx: f64,
    dy: f64,
    distance_sq: i64,
}

/// Prey rows within `radius` of the predator.
fn prey_in_circle(predator: CellId, cells: &[CellRow], radius: i32) -> Vec<Prey> {
    cells
        .iter()
        .filter(|row| row.status.is_prey() && within(row.id, predator.x, predator.y, radius))
        .map(|row| Prey {
            id: row.id,
            intensity: row.status.prey_intensity(),
            dx: f64::from(row.id.x) - f64::from(predator.x),
            dy: f64::from(row.id.y) - f64::from(predator.y),
            distance_sq: row.id.distance_squared_to(predator.x, predator.y),
        })
        .collect()
}

/// Choose the predator's next cell, or `None` when no prey is in range.
pub fn next_cell<R: Rng + ?Sized>(
    predator: CellId,
    cells: &[CellRow],
    range: i32,
    rng: &mut R,
) -> Option<CellId> {
    if let Some(next) = short_range(predator, cells, range, rng) {
        debug!(predator = %predator, next = %next, "Pursuit: short range");
        return Some(next);
    }
    let next = long_range(predator, cells, range);
    match next {
        Some(next) => debug!(predator = %predator, next = %next, "Pursuit: long range"),
        None => debug!(predator = %predator, range, "Pursuit: no prey in range"),
    }
    next
}

/// The short-range pass.
pub fn short_range<R: Rng + ?Sized>(
    predator: CellId,
    cells: &[CellRow],
    range: i32,
    rng: &mut R,
) -> Option<CellId> {
    let mut prey = prey_in_circle(predator, cells, range.min(SHORT_RANGE));
    prey.sort_by(|a, b| {
        b.intensity
            .cmp(&a.intensity)
            .then(a.distance_sq.cmp(&b.distance_sq))
    });
    let best = *prey.first()?;

    let adjacent: Vec<CellId> = predator
        .neighbors()
        .into_iter()
        .filter(|n| {
            prey.iter()
                .any(|p| p.id == *n && p.intensity == best.intensity)
        })
        .collect();
    if let Some(choice) = adjacent.choose(rng) {
        return Some(*choice);
    }

    Some(Heading::from_vector(best.dx, best.dy).step(predator))
}

/// The long-range pass.
pub fn long_range(predator: CellId, cells: &[CellRow], range: i32) -> Option<CellId> {
    let two_sigma_sq = 2.0 * SCENT_SIGMA * SCENT_SIGMA;
    let mut field = (0.0_f64, 0.0_f64);
    let mut any = false;

    for prey in prey_in_circle(predator, cells, range) {
        let distance = prey.dx.hypot(prey.dy);
        let (unit_x, unit_y) = if distance > 0.0 {
            (prey.dx / distance, prey.dy / distance)
        } else {
            (0.0, 0.0)
        };
        let scent = f64::from(prey.intensity) * (-(distance * distance) / two_sigma_sq).exp();
        if scent > MIN_SCENT {
            field.0 += unit_x * scent;
            field.1 += unit_y * scent;
            any = true;
        }
    }

    if !any {
        return None;
    }
    Some(Heading::from_vector(field.0, field.1).step(predator))
}
