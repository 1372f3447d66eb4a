//! The alarm lifecycle state machine.
//!
//! Decides the status of an identity from the incoming event and the previous
//! record. Flapping identities become `Bagot`, fresh OK/alert flips are held
//! back as `Stealthy` for a grace period, and cancelled alarms only come back
//! when the state changes in a way the configuration allows.
//!
//! This module performs no I/O. It takes the previous record as an immutable
//! snapshot and returns the new [`Lifecycle`].

use crate::{
    config::StatusConfig,
    models::{AlarmRecord, AlarmStatus, BagotWindow, Event, Lifecycle, StealthyWindow},
};

/// Computes lifecycle transitions under a [`StatusConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateMachine {
    config: StatusConfig,
}

impl StateMachine {
    /// Creates a state machine using `config`.
    pub fn new(config: StatusConfig) -> Self {
        Self { config }
    }

    /// The thresholds in effect.
    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    /// Replaces the thresholds in effect.
    pub fn set_config(&mut self, config: StatusConfig) {
        self.config = config;
    }

    /// Whether the identity flapped often enough inside the window.
    fn is_bagot(&self, bagot: &BagotWindow, timestamp: i64) -> bool {
        bagot.is_flapping(timestamp, self.config.bagot_time, self.config.bagot_freq)
    }

    /// Whether the last flip is recent enough to hold the change back.
    fn is_stealthy(
        &self,
        stealthy: &StealthyWindow,
        timestamp: i64,
        previous_status: AlarmStatus,
    ) -> bool {
        stealthy.is_within(timestamp, self.config.stealthy_time)
            && previous_status != AlarmStatus::Stealthy
    }

    /// Whether a previously stealthy record is still inside its display
    /// delay.
    fn stays_stealthy(&self, previous: &AlarmRecord, timestamp: i64) -> bool {
        previous.status == AlarmStatus::Stealthy
            && StealthyWindow::from_field(previous.ts_first_stealthy)
                .is_within(timestamp, self.config.stealthy_show)
    }

    /// A cancelled alarm is re-evaluated only when its state changed and
    /// either restoration is enabled or the change goes to or from OK.
    fn is_restorable(&self, incoming: &Event, previous: &AlarmRecord) -> bool {
        if previous.status != AlarmStatus::Canceled {
            return true;
        }
        previous.state() != incoming.state
            && (self.config.restore_event || incoming.state == 0 || previous.state() == 0)
    }

    /// Computes the lifecycle of `incoming`, observed at `timestamp`, given
    /// the previous record of the same identity.
    ///
    /// Events marked with `pass_status` were already resolved by the expiry
    /// sweep and keep the previous lifecycle.
    pub fn check_statuses(
        &self,
        incoming: &Event,
        timestamp: i64,
        previous: &AlarmRecord,
    ) -> Lifecycle {
        if incoming.pass_status {
            return previous.lifecycle();
        }

        let mut bagot = BagotWindow::from_fields(previous.ts_first_bagot, previous.bagot_freq);
        let mut stealthy = StealthyWindow::from_field(previous.ts_first_stealthy);

        let flipped = (previous.state() == 0) != (incoming.state == 0);
        if flipped {
            stealthy.enter(timestamp);
            bagot.record_flip(timestamp);
        }
        bagot.expire(timestamp, self.config.bagot_time);

        let status = if self.is_restorable(incoming, previous) {
            self.decide(incoming, timestamp, previous, &bagot, &stealthy)
        } else {
            AlarmStatus::Canceled
        };

        tracing::debug!(
            previous_status = %previous.status,
            status = %status,
            bagot_freq = bagot.flips(),
            flipped,
            "Computed alarm status."
        );
        Lifecycle::new(status, bagot, stealthy)
    }

    fn decide(
        &self,
        incoming: &Event,
        timestamp: i64,
        previous: &AlarmRecord,
        bagot: &BagotWindow,
        stealthy: &StealthyWindow,
    ) -> AlarmStatus {
        let is_bagot = self.is_bagot(bagot, timestamp);
        let is_stealthy = self.is_stealthy(stealthy, timestamp, previous.status);

        if self.stays_stealthy(previous, timestamp) {
            return if is_bagot { AlarmStatus::Bagot } else { AlarmStatus::Stealthy };
        }

        if is_bagot {
            AlarmStatus::Bagot
        } else if !is_stealthy {
            if incoming.state == 0 { AlarmStatus::Off } else { AlarmStatus::Ongoing }
        } else if incoming.state == 0 || previous.status != AlarmStatus::Off {
            AlarmStatus::Stealthy
        } else {
            // An alarm raised on a quiet identity is shown at once.
            AlarmStatus::Ongoing
        }
    }

    /// Resolves a stealthy record whose display delay has elapsed at `now`:
    /// alerts become `Ongoing`, OK states become `Off`. Returns `None` when
    /// the record must stay as it is.
    pub fn resolve_stealthy(&self, record: &AlarmRecord, now: i64) -> Option<Lifecycle> {
        if record.status != AlarmStatus::Stealthy {
            return None;
        }
        if !StealthyWindow::from_field(record.ts_first_stealthy)
            .has_elapsed(now, self.config.stealthy_show)
        {
            return None;
        }

        let status = if record.state() > 0 { AlarmStatus::Ongoing } else { AlarmStatus::Off };
        Some(Lifecycle::new(status, record.lifecycle().bagot(), StealthyWindow::closed()))
    }
}
