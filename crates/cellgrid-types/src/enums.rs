//! Enumeration types for the grid.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Color status of a cell.
///
/// `Inactive` is the empty value. `Red`, `Orange`, `Green` and `Blue` are
/// prey colors a predator hunts; `Predator` marks the predator's head and
/// its lingering trail.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Unlit cell.
    #[default]
    Inactive,
    /// Red prey.
    Red,
    /// Green prey.
    Green,
    /// Blue prey.
    Blue,
    /// Orange prey.
    Orange,
    /// Predator head or trail.
    Predator,
}

/// Error returned when a status name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status {0:?}")]
pub struct UnknownStatus(pub String);

impl Status {
    /// All statuses in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Inactive,
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Orange,
        Self::Predator,
    ];

    /// Lower-case wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Orange => "orange",
            Self::Predator => "predator",
        }
    }

    /// How strongly a predator is drawn to this color.
    ///
    /// `red=1, orange=2, green=3, blue=4`; every other status is 0 and is
    /// not prey.
    pub const fn prey_intensity(self) -> u8 {
        match self {
            Self::Red => 1,
            Self::Orange => 2,
            Self::Green => 3,
            Self::Blue => 4,
            Self::Inactive | Self::Predator => 0,
        }
    }

    /// Whether a predator hunts this color.
    pub const fn is_prey(self) -> bool {
        self.prey_intensity() > 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    /// Case-insensitive; `"default"` is accepted as an alias for
    /// `inactive`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "default" {
            return Ok(Self::Inactive);
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == lower)
            .ok_or_else(|| UnknownStatus(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prey_intensities() {
        assert_eq!(Status::Red.prey_intensity(), 1);
        assert_eq!(Status::Orange.prey_intensity(), 2);
        assert_eq!(Status::Green.prey_intensity(), 3);
        assert_eq!(Status::Blue.prey_intensity(), 4);
        assert!(!Status::Inactive.is_prey());
        assert!(!Status::Predator.is_prey());
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Blue".parse::<Status>(), Ok(Status::Blue));
        assert_eq!("default".parse::<Status>(), Ok(Status::Inactive));
        assert!("purple".parse::<Status>().is_err());
    }

    #[test]
    fn names_round_trip() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
    }

    #[test]
    fn serde_is_lowercase() {
        let json = serde_json::to_string(&Status::Predator).unwrap_or_default();
        assert_eq!(json, "\"predator\"");
    }
}
