//! The sensor aggregate.
//!
//! A sensor is a free-form status holder keyed by an arbitrary string. It
//! shares the entity runtime with grid cells but has no guards and no
//! propagation: every update is recorded.

use core::fmt;
use core::str::FromStr;

use cellgrid_store::{Aggregate, CommandContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Non-blank sensor identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SensorId(String);

impl SensorId {
    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SensorId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::BlankSensorId);
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl TryFrom<String> for SensorId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SensorId> for String {
    fn from(id: SensorId) -> Self {
        id.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Folded state of one sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorState {
    /// `None` until the first update.
    pub id: Option<SensorId>,
    /// Last reported status.
    pub status: String,
    /// Client-reported time of the last update.
    pub updated_at: DateTime<Utc>,
}

/// Commands a sensor accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorCommand {
    /// Record a status report.
    UpdateStatus {
        /// Reported status.
        status: String,
        /// When the sensor reported it.
        updated_at: DateTime<Utc>,
    },
}

/// Events persisted on a sensor's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SensorEvent {
    /// A status report was recorded.
    StatusUpdated {
        /// The sensor.
        id: SensorId,
        /// Reported status.
        status: String,
        /// When the sensor reported it.
        updated_at: DateTime<Utc>,
    },
}

impl Aggregate for SensorState {
    const KIND: &'static str = "sensor";
    type Id = SensorId;
    type Command = SensorCommand;
    type Event = SensorEvent;

    fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    fn decide(
        &self,
        id: &SensorId,
        command: &SensorCommand,
        _context: &CommandContext,
    ) -> Vec<SensorEvent> {
        match command {
            SensorCommand::UpdateStatus { status, updated_at } => {
                vec![SensorEvent::StatusUpdated {
                    id: id.clone(),
                    status: status.clone(),
                    updated_at: *updated_at,
                }]
            }
        }
    }

    fn apply(self, event: &SensorEvent) -> Self {
        match event {
            SensorEvent::StatusUpdated {
                id,
                status,
                updated_at,
            } => Self {
                id: Some(id.clone()),
                status: status.clone(),
                updated_at: *updated_at,
            },
        }
    }
}
