//! Incoming check/probe events.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::routing::routing_key;

/// A schemaless document as stored in the current-state and history
/// collections.
pub type Document = serde_json::Map<String, Value>;

/// Fields owned by the archiver. Values supplied upstream for these keys are
/// dropped before an event is turned into a record.
pub const LIFECYCLE_FIELDS: &[&str] = &[
    "_id",
    "event_id",
    "status",
    "bagot_freq",
    "ts_first_bagot",
    "ts_first_stealthy",
    "previous_state",
    "last_state_change",
    "previous_state_change_ts",
];

/// One signal emitted by a check, as delivered by the message bus.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Routing key the event was published under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rk: Option<String>,

    /// Epoch seconds. Defaults to the reception time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// `0` is OK, anything above is an alert severity.
    pub state: u32,

    /// `0` soft, `1` hard.
    pub state_type: u8,

    /// Connector type that produced the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,

    /// Connector instance name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_name: Option<String>,

    /// Kind of event (`check`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// `component` or `resource`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    /// Monitored component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    /// Monitored resource on the component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Check output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Acknowledgement metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<Value>,

    /// Cancellation metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<Value>,

    /// Operator pin on the current state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_state: Option<bool>,

    /// Set by the expiry sweep when the status is already decided.
    #[serde(default, skip_serializing, deserialize_with = "deserialize_flag")]
    pub pass_status: bool,

    /// Any other field (tickets, perf data, ...).
    #[serde(flatten)]
    pub extra: Document,
}

impl Event {
    /// Whether the event reports an alert.
    pub fn is_alert(&self) -> bool {
        self.state > 0
    }

    /// The identity of the monitored check: the `rk` field, or the routing key
    /// built from the descriptor fields.
    pub fn identity(&self) -> Option<String> {
        self.rk.clone().or_else(|| routing_key(self))
    }

    /// Drops any archiver-owned field an upstream producer may have set.
    pub fn strip_lifecycle_fields(&mut self) {
        self.extra.retain(|key, _| !LIFECYCLE_FIELDS.contains(&key.as_str()));
    }
}

/// Accepts `true`/`false` as well as the integer flags older producers emit.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        _ => false,
    })
}
