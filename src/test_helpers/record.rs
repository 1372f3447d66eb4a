//! A builder for creating `AlarmRecord` instances for testing.

use serde_json::Value;

use super::EventBuilder;
use crate::models::{AlarmRecord, AlarmStatus};

/// A builder for creating `AlarmRecord` instances for testing.
///
/// Fields are written as given, without going through the state machine, so
/// tests can set up any stored situation.
#[derive(Debug, Clone)]
pub struct AlarmRecordBuilder {
    id: String,
    event: EventBuilder,
    state: u32,
    status: Option<AlarmStatus>,
    bagot_freq: u32,
    ts_first_bagot: i64,
    ts_first_stealthy: i64,
    previous_state: Option<u32>,
    last_state_change: Option<i64>,
}

impl AlarmRecordBuilder {
    /// Creates a builder for a record of `id`, OK and `Off` by default.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            event: EventBuilder::new(),
            state: 0,
            status: None,
            bagot_freq: 0,
            ts_first_bagot: 0,
            ts_first_stealthy: 0,
            previous_state: None,
            last_state_change: None,
        }
    }

    /// Sets the alarm state. Unless a status is set, it is derived from the
    /// state: `Ongoing` for alerts, `Off` otherwise.
    pub fn state(mut self, state: u32) -> Self {
        self.state = state;
        self
    }

    /// Sets the state type.
    pub fn state_type(mut self, state_type: u8) -> Self {
        self.event = self.event.state_type(state_type);
        self
    }

    /// Sets the event timestamp.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.event = self.event.timestamp(timestamp);
        self
    }

    /// Sets the routing key.
    pub fn rk(mut self, rk: &str) -> Self {
        self.event = self.event.rk(rk);
        self
    }

    /// Sets the status.
    pub fn status(mut self, status: AlarmStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Opens a bagot window at `ts_first_bagot` holding `bagot_freq` flips.
    pub fn bagot(mut self, ts_first_bagot: i64, bagot_freq: u32) -> Self {
        self.ts_first_bagot = ts_first_bagot;
        self.bagot_freq = bagot_freq;
        self
    }

    /// Sets the start of the stealthy period.
    pub fn ts_first_stealthy(mut self, ts_first_stealthy: i64) -> Self {
        self.ts_first_stealthy = ts_first_stealthy;
        self
    }

    /// Sets the state before the last change.
    pub fn previous_state(mut self, previous_state: u32) -> Self {
        self.previous_state = Some(previous_state);
        self
    }

    /// Sets the time of the last state change.
    pub fn last_state_change(mut self, last_state_change: i64) -> Self {
        self.last_state_change = Some(last_state_change);
        self
    }

    /// Sets the check output.
    pub fn output(mut self, output: &str) -> Self {
        self.event = self.event.output(output);
        self
    }

    /// Sets the acknowledgement.
    pub fn ack(mut self, ack: Value) -> Self {
        self.event = self.event.ack(ack);
        self
    }

    /// Sets the cancellation.
    pub fn cancel(mut self, cancel: Value) -> Self {
        self.event = self.event.cancel(cancel);
        self
    }

    /// Sets the operator pin.
    pub fn keep_state(mut self, keep_state: bool) -> Self {
        self.event = self.event.keep_state(keep_state);
        self
    }

    /// Adds a free-form field.
    pub fn extra(mut self, key: &str, value: Value) -> Self {
        self.event = self.event.extra(key, value);
        self
    }

    /// Builds the `AlarmRecord`.
    pub fn build(self) -> AlarmRecord {
        let status = self.status.unwrap_or(if self.state > 0 {
            AlarmStatus::Ongoing
        } else {
            AlarmStatus::Off
        });
        AlarmRecord {
            id: self.id,
            event: self.event.state(self.state).build(),
            status,
            bagot_freq: self.bagot_freq,
            ts_first_bagot: self.ts_first_bagot,
            ts_first_stealthy: self.ts_first_stealthy,
            previous_state: self.previous_state,
            last_state_change: self.last_state_change,
            previous_state_change_ts: None,
        }
    }
}
