//! Change-set computation between an incoming event and the stored record of
//! the same identity.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::state_machine::StateMachine;
use crate::{
    models::{AlarmRecord, AlarmStatus, Document, Event, HistoryEntry, Lifecycle},
    persistence::UpdateOperation,
};

/// Fields never copied into an update change-set.
pub const EXCLUDED_FIELDS: &[&str] = &["perf_data_array", "processing"];

/// What the store returned for an identity.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviousState {
    /// A well-formed current-state record.
    Found {
        /// The decoded record.
        record: AlarmRecord,
        /// The document as stored, used for diffing.
        document: Document,
    },
    /// No record exists for the identity.
    FirstSeen,
    /// A record exists but cannot be decoded.
    Anomaly {
        /// The document as stored.
        document: Document,
        /// Why decoding failed.
        reason: String,
    },
}

impl PreviousState {
    /// Tags the result of a lookup.
    pub fn classify(document: Option<Document>) -> Self {
        match document {
            None => PreviousState::FirstSeen,
            Some(document) => match AlarmRecord::from_document(&document) {
                Ok(record) => PreviousState::Found { record, document },
                Err(e) => PreviousState::Anomaly { document, reason: e.to_string() },
            },
        }
    }
}

/// The write applied to the current-state collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentStateWrite {
    /// A new document.
    Insert(Document),
    /// A change-set on an existing document.
    Update(UpdateOperation),
}

/// The outcome of evaluating one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The record as it stands once the write is applied.
    pub record: AlarmRecord,
    /// `None` when nothing changed.
    pub write: Option<CurrentStateWrite>,
    /// Snapshot to append to the history log, on a state transition.
    pub history: Option<HistoryEntry>,
}

/// Produces current-state writes and history entries from incoming events.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine;

impl DiffEngine {
    /// Creates a diff engine.
    pub fn new() -> Self {
        Self
    }

    /// Evaluates `event` for `id` against what the store returned.
    ///
    /// Events without a timestamp are stamped with `now`, which also names the
    /// history entry.
    pub fn evaluate(
        &self,
        id: &str,
        mut event: Event,
        previous: &PreviousState,
        machine: &StateMachine,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, serde_json::Error> {
        let timestamp = *event.timestamp.get_or_insert(now.timestamp());

        match previous {
            PreviousState::FirstSeen => {
                let record = fresh_record(id, event, timestamp);
                let document = record.to_document()?;
                tracing::info!(id, state = record.state(), status = %record.status, "New event.");
                let history = HistoryEntry::new(id, document.clone(), now);
                Ok(Evaluation {
                    record,
                    write: Some(CurrentStateWrite::Insert(document)),
                    history: Some(history),
                })
            }
            PreviousState::Anomaly { document, reason } => {
                tracing::warn!(
                    id,
                    reason = %reason,
                    "Previous record is malformed, evaluating the event as new."
                );
                let record = fresh_record(id, event, timestamp);
                self.update(id, record, document, true, now)
            }
            PreviousState::Found { record: previous_record, document } => {
                let state = event.state;
                let state_type = event.state_type;
                let lifecycle = machine.check_statuses(&event, timestamp, previous_record);

                let mut record = AlarmRecord::new(id, event, lifecycle);
                let last_change = previous_record.last_state_change.unwrap_or(timestamp);
                record.last_state_change = Some(last_change);
                record.previous_state_change_ts = previous_record.previous_state_change_ts;
                record.previous_state = previous_record.previous_state;

                let state_changed = state != previous_record.state();
                if state_changed {
                    record.previous_state = Some(previous_record.state());
                }
                if state_changed || state_type != previous_record.event.state_type {
                    if state == 0 || previous_record.state() == 0 {
                        record.previous_state_change_ts = Some(last_change);
                    }
                    record.last_state_change = Some(timestamp);
                    tracing::debug!(id, state, state_type, "Event has changed.");
                }

                self.update(id, record, document, state_changed, now)
            }
        }
    }

    /// Builds the update of an existing document and, when `log` is set, the
    /// history entry of the transition.
    fn update(
        &self,
        id: &str,
        mut record: AlarmRecord,
        previous: &Document,
        log: bool,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, serde_json::Error> {
        let pins_state = record.event.keep_state.is_some();
        let forced = preserve_fields(&mut record, previous);
        let current = record.to_document()?;
        let mut changes = diff(&current, previous, forced);

        let history = log.then(|| {
            let mut snapshot = current;
            if let Some(ack) = previous.get("ack") {
                snapshot.insert("ack".to_string(), ack.clone());
            }
            tracing::info!(id, state = record.state(), "State changed, logging event.");
            HistoryEntry::new(id, snapshot, now)
        });

        apply_keep_state(&mut record, previous, pins_state, &mut changes);

        let write = (!changes.is_empty())
            .then(|| CurrentStateWrite::Update(UpdateOperation { id: id.to_string(), changes }));
        Ok(Evaluation { record, write, history })
    }
}

fn fresh_record(id: &str, event: Event, timestamp: i64) -> AlarmRecord {
    let state = event.state;
    let mut record = AlarmRecord::new(id, event, Lifecycle::first_seen(state));
    record.last_state_change = Some(timestamp);
    record
}

fn empty_object() -> Value {
    Value::Object(Document::new())
}

/// Applies the acknowledgement, cancellation and ticket rules to `record`.
/// Returns the fields that must be written even when unchanged.
fn preserve_fields(record: &mut AlarmRecord, previous: &Document) -> Document {
    let status = record.status;
    let event = &mut record.event;
    let mut forced = Document::new();

    if event.ack.is_some() || previous.contains_key("ack") {
        let ack = if status == AlarmStatus::Off {
            empty_object()
        } else {
            event.ack.take().or_else(|| previous.get("ack").cloned()).unwrap_or_else(empty_object)
        };
        event.ack = Some(ack.clone());
        forced.insert("ack".to_string(), ack);
    }

    if event.cancel.is_some() || previous.contains_key("cancel") {
        let cancel = if matches!(status, AlarmStatus::Off | AlarmStatus::Ongoing) {
            empty_object()
        } else {
            event
                .cancel
                .take()
                .or_else(|| previous.get("cancel").cloned())
                .unwrap_or_else(empty_object)
        };
        event.cancel = Some(cancel.clone());
        forced.insert("cancel".to_string(), cancel);
    }

    if status == AlarmStatus::Off {
        let tickets: Vec<String> = previous
            .keys()
            .chain(event.extra.keys())
            .filter(|key| key.starts_with("ticket"))
            .cloned()
            .collect();
        for key in tickets {
            event.extra.insert(key, Value::Null);
        }
    }

    forced
}

/// Every field of `current` that is absent from or different in `previous`,
/// on top of `forced`.
fn diff(current: &Document, previous: &Document, forced: Document) -> Document {
    let mut changes = forced;
    for (key, value) in current {
        if EXCLUDED_FIELDS.contains(&key.as_str()) || changes.contains_key(key) {
            continue;
        }
        if previous.get(key) != Some(value) {
            changes.insert(key.clone(), value.clone());
        }
    }
    changes
}

/// Honors an operator pin on the previous state until the identity is OK
/// again.
fn apply_keep_state(
    record: &mut AlarmRecord,
    previous: &Document,
    pins_state: bool,
    changes: &mut Document,
) {
    let pinned = previous.get("keep_state").and_then(Value::as_bool).unwrap_or(false);
    if !pinned {
        return;
    }

    if record.state() == 0 {
        record.event.keep_state = Some(false);
        changes.insert("keep_state".to_string(), Value::Bool(false));
        return;
    }
    if pins_state {
        return;
    }

    let pinned_state = previous.get("state").cloned().unwrap_or(Value::from(0));
    let pinned_output = match previous.get("output") {
        Some(Value::String(output)) => output.clone(),
        _ => String::new(),
    };
    let observed_output = Value::String(record.event.output.clone().unwrap_or_default());

    if let Some(state) = pinned_state.as_u64().and_then(|s| u32::try_from(s).ok()) {
        record.event.state = state;
    }
    record.event.output = Some(pinned_output.clone());
    record.event.extra.insert("change_state_output".to_string(), observed_output.clone());

    changes.insert("state".to_string(), pinned_state);
    changes.insert("change_state_output".to_string(), observed_output);
    changes.insert("output".to_string(), Value::String(pinned_output));
}
