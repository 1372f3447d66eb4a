//! Current-state records and history-log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    event::{Document, Event},
    status::AlarmStatus,
    window::{BagotWindow, StealthyWindow},
};

/// The derived lifecycle of one identity: its status and debounce windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    status: AlarmStatus,
    bagot: BagotWindow,
    stealthy: StealthyWindow,
}

impl Lifecycle {
    /// Builds a lifecycle. The stealthy window is dropped unless the status
    /// is `Stealthy` or `Bagot`.
    pub fn new(status: AlarmStatus, bagot: BagotWindow, stealthy: StealthyWindow) -> Self {
        let stealthy = if status.tracks_stealthy() { stealthy } else { StealthyWindow::closed() };
        Self { status, bagot, stealthy }
    }

    /// The lifecycle of an identity seen for the first time.
    pub fn first_seen(state: u32) -> Self {
        let status = if state > 0 { AlarmStatus::Ongoing } else { AlarmStatus::Off };
        Self::new(status, BagotWindow::closed(), StealthyWindow::closed())
    }

    /// The status.
    pub fn status(&self) -> AlarmStatus {
        self.status
    }

    /// The flapping window.
    pub fn bagot(&self) -> BagotWindow {
        self.bagot
    }

    /// The stealthy grace window.
    pub fn stealthy(&self) -> StealthyWindow {
        self.stealthy
    }
}

fn default_status() -> AlarmStatus {
    AlarmStatus::Ongoing
}

/// The durable current-state document of one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// Identity of the monitored check.
    #[serde(rename = "_id")]
    pub id: String,

    /// The last event received for the identity.
    #[serde(flatten)]
    pub event: Event,

    /// Lifecycle status.
    #[serde(default = "default_status")]
    pub status: AlarmStatus,

    /// Flips counted in the open bagot window.
    #[serde(default)]
    pub bagot_freq: u32,

    /// Start of the open bagot window, `0` when none.
    #[serde(default)]
    pub ts_first_bagot: i64,

    /// Start of the stealthy grace period, `0` when none.
    #[serde(default)]
    pub ts_first_stealthy: i64,

    /// Alarm state before the last state change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<u32>,

    /// Timestamp of the last state or state-type change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state_change: Option<i64>,

    /// `last_state_change` before the last change into or out of OK.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state_change_ts: Option<i64>,
}

impl AlarmRecord {
    /// Creates a record for `id` from an incoming event with the given
    /// lifecycle.
    pub fn new(id: impl Into<String>, mut event: Event, lifecycle: Lifecycle) -> Self {
        event.strip_lifecycle_fields();
        event.pass_status = false;
        let mut record = Self {
            id: id.into(),
            event,
            status: lifecycle.status(),
            bagot_freq: 0,
            ts_first_bagot: 0,
            ts_first_stealthy: 0,
            previous_state: None,
            last_state_change: None,
            previous_state_change_ts: None,
        };
        record.apply_lifecycle(lifecycle);
        record
    }

    /// Decodes a stored document.
    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(document.clone()))
    }

    /// Encodes the record as a storable document.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(document) => Ok(document),
            other => Err(serde::ser::Error::custom(format!(
                "record serialized to a non-object value: {other}"
            ))),
        }
    }

    /// The alarm state.
    pub fn state(&self) -> u32 {
        self.event.state
    }

    /// The event timestamp, `0` when unknown.
    pub fn timestamp(&self) -> i64 {
        self.event.timestamp.unwrap_or(0)
    }

    /// The lifecycle currently stored on the record.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(
            self.status,
            BagotWindow::from_fields(self.ts_first_bagot, self.bagot_freq),
            StealthyWindow::from_field(self.ts_first_stealthy),
        )
    }

    /// Writes `lifecycle` into the record's persisted fields.
    pub fn apply_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.status = lifecycle.status();
        self.bagot_freq = lifecycle.bagot().flips();
        self.ts_first_bagot = lifecycle.bagot().ts_first_bagot();
        self.ts_first_stealthy = lifecycle.stealthy().ts_first_stealthy();
    }
}

/// An immutable snapshot appended to the history log on a state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// `<identity>.<secs>.<micros>`.
    pub id: String,
    /// Identity of the record the snapshot was taken from.
    pub event_id: String,
    /// The snapshot, including `_id` and `event_id`.
    pub document: Document,
}

impl HistoryEntry {
    /// Builds the log identity of a snapshot of `event_id` taken at
    /// `logged_at`.
    pub fn history_id(event_id: &str, logged_at: DateTime<Utc>) -> String {
        format!("{}.{}.{:06}", event_id, logged_at.timestamp(), logged_at.timestamp_subsec_micros())
    }

    /// Wraps `snapshot` as the history entry of `event_id` logged at
    /// `logged_at`.
    pub fn new(event_id: &str, mut snapshot: Document, logged_at: DateTime<Utc>) -> Self {
        let id = Self::history_id(event_id, logged_at);
        snapshot.insert("_id".to_string(), Value::String(id.clone()));
        snapshot.insert("event_id".to_string(), Value::String(event_id.to_string()));
        Self { id, event_id: event_id.to_string(), document: snapshot }
    }

    /// Reads an entry back from the history collection.
    pub fn from_document(document: Document) -> Option<Self> {
        let id = document.get("_id")?.as_str()?.to_string();
        let event_id = document.get("event_id")?.as_str()?.to_string();
        Some(Self { id, event_id, document })
    }
}
