//! Buffering of incoming events between two flushes.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};

use crate::models::Event;

/// Accumulates events keyed by identity until a flush is due.
///
/// A repeated identity overwrites the buffered event but keeps its position,
/// so the size trigger counts distinct identities rather than arrivals.
#[derive(Debug)]
pub struct IngestBuffer {
    events: Vec<(String, Event)>,
    positions: HashMap<String, usize>,
    bulk_amount: usize,
    bulk_delay: Duration,
    last_flush: DateTime<Utc>,
}

impl IngestBuffer {
    /// Creates an empty buffer whose delay starts counting at `now`.
    pub fn new(bulk_amount: usize, bulk_delay: Duration, now: DateTime<Utc>) -> Self {
        Self {
            events: Vec::new(),
            positions: HashMap::new(),
            bulk_amount: bulk_amount.max(1),
            bulk_delay,
            last_flush: now,
        }
    }

    /// Buffers `event` for `id`, replacing any event already buffered for it.
    /// Returns whether a flush should fire now.
    pub fn accept(&mut self, id: String, event: Event, now: DateTime<Utc>) -> bool {
        match self.positions.get(&id) {
            Some(&position) => self.events[position].1 = event,
            None => {
                self.positions.insert(id.clone(), self.events.len());
                self.events.push((id, event));
            }
        }
        self.events.len() >= self.bulk_amount || self.is_due(now)
    }

    /// Whether the bulk delay has elapsed since the last flush.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.last_flush);
        elapsed.to_std().is_ok_and(|elapsed| elapsed >= self.bulk_delay)
    }

    /// Drains the buffered events in arrival order of their identities and
    /// restarts the delay at `now`.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Vec<(String, Event)> {
        self.positions.clear();
        self.last_flush = now;
        std::mem::take(&mut self.events)
    }

    /// Number of distinct identities buffered.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
