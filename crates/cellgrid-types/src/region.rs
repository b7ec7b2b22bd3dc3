//! Deployment region tags.
//!
//! Every command and persisted event carries the region that originated
//! it. The propagation consumer compares an event's origin against its own
//! region to decide whether the event may trigger neighbor commands.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Display name used when no self region is configured.
pub const LOCAL_REGION_NAME: &str = "local-development";

/// The deployment zone a command or event originated in.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    /// No self region is known (single-node or development deployment).
    #[default]
    Local,
    /// A named region of a multi-region deployment.
    Named(String),
}

impl Region {
    /// Interpret a configured or reported region name.
    ///
    /// Blank names and [`LOCAL_REGION_NAME`] map to [`Region::Local`].
    pub fn from_name(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed == LOCAL_REGION_NAME {
            Self::Local
        } else {
            Self::Named(trimmed.to_owned())
        }
    }

    /// The region's name as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local => LOCAL_REGION_NAME,
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Region {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw))
    }
}
