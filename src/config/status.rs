//! Status-management settings shared by the state machine and the expiry
//! sweep.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Document;

/// Name of the stored configuration document.
pub const STATUS_CONFIG_NAME: &str = "statusmanagement";

/// Thresholds of the flapping and stealthy debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Flips inside `bagot_time` needed to consider an identity flapping.
    pub bagot_freq: u32,

    /// Length of the flapping window, in seconds.
    pub bagot_time: i64,

    /// Grace period after a flip during which a change stays stealthy.
    pub stealthy_time: i64,

    /// How long a stealthy record is held before it is resolved.
    pub stealthy_show: i64,

    /// Whether a cancelled alarm is restored by any state change.
    pub restore_event: bool,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            bagot_freq: 10,
            bagot_time: 3600,
            stealthy_time: 360,
            stealthy_show: 360,
            restore_event: true,
        }
    }
}

impl StatusConfig {
    /// Returns a copy updated with the fields present in a stored
    /// configuration document. Missing or mistyped fields keep their current
    /// value.
    pub fn merged_with(&self, document: &Document) -> Self {
        let int = |key: &str, current: i64| document.get(key).and_then(Value::as_i64).unwrap_or(current);

        Self {
            bagot_freq: document
                .get("bagot_freq")
                .and_then(Value::as_u64)
                .and_then(|freq| u32::try_from(freq).ok())
                .unwrap_or(self.bagot_freq),
            bagot_time: int("bagot_time", self.bagot_time),
            stealthy_time: int("stealthy_time", self.stealthy_time),
            stealthy_show: int("stealthy_show", self.stealthy_show),
            restore_event: document
                .get("restore_event")
                .and_then(Value::as_bool)
                .unwrap_or(self.restore_event),
        }
    }
}
