//! The five-way alarm lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a monitored identity, persisted as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AlarmStatus {
    /// No active alarm.
    Off,
    /// An alarm is raised and stable.
    Ongoing,
    /// A state change was seen recently and is held back from escalation.
    Stealthy,
    /// The identity is flapping.
    Bagot,
    /// An operator cancelled the alarm.
    Canceled,
}

impl AlarmStatus {
    /// Returns the integer code stored in documents.
    pub fn code(self) -> u8 {
        match self {
            AlarmStatus::Off => 0,
            AlarmStatus::Ongoing => 1,
            AlarmStatus::Stealthy => 2,
            AlarmStatus::Bagot => 3,
            AlarmStatus::Canceled => 4,
        }
    }

    /// Whether a record in this status keeps its `ts_first_stealthy` marker.
    pub fn tracks_stealthy(self) -> bool {
        matches!(self, AlarmStatus::Stealthy | AlarmStatus::Bagot)
    }
}

impl From<AlarmStatus> for u8 {
    fn from(status: AlarmStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for AlarmStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(AlarmStatus::Off),
            1 => Ok(AlarmStatus::Ongoing),
            2 => Ok(AlarmStatus::Stealthy),
            3 => Ok(AlarmStatus::Bagot),
            4 => Ok(AlarmStatus::Canceled),
            other => Err(format!("unknown alarm status code {other}")),
        }
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlarmStatus::Off => "Off",
            AlarmStatus::Ongoing => "On going",
            AlarmStatus::Stealthy => "Stealthy",
            AlarmStatus::Bagot => "Bagot",
            AlarmStatus::Canceled => "Cancelled",
        };
        f.write_str(name)
    }
}
