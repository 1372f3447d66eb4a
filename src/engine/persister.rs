//! Batched persistence of buffered events.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use super::{
    diff::{CurrentStateWrite, DiffEngine, PreviousState},
    error::ArchiverError,
    state_machine::StateMachine,
};
use crate::{
    models::{Document, Event},
    persistence::{BulkWriteReport, Collection, EventStore, UpdateOperation},
};

/// Counters of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Distinct identities processed.
    pub events: usize,
    /// Current-state documents inserted.
    pub inserted: usize,
    /// Current-state documents updated.
    pub updated: usize,
    /// Updates whose document had disappeared.
    pub unmatched: usize,
    /// History entries appended.
    pub logged: usize,
    /// Previous records that could not be decoded.
    pub anomalies: usize,
    /// Operations rejected by the store or events that could not be
    /// evaluated.
    pub failed: usize,
}

impl FlushReport {
    fn absorb(&mut self, report: &BulkWriteReport) {
        if report.collection == Collection::EventsLog {
            self.logged += report.written;
        }
        self.unmatched += report.unmatched;
        self.failed += report.failures.len();
    }
}

/// Turns a batch of buffered events into bulk writes.
pub struct BatchPersister<S: EventStore + ?Sized> {
    store: Arc<S>,
    diff: DiffEngine,
    /// Instant stamped on the history entries of the previous flush.
    last_logged_at: Option<DateTime<Utc>>,
}

impl<S: EventStore + ?Sized> BatchPersister<S> {
    /// Creates a persister writing to `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store, diff: DiffEngine::new(), last_logged_at: None }
    }

    /// The instant stamped on this flush's history entries: `now`, or one
    /// microsecond past the previous flush when the clock did not move
    /// forward. Identities are distinct inside a flush, so history ids never
    /// repeat.
    fn next_logged_at(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let logged_at = match self.last_logged_at {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_logged_at = Some(logged_at);
        logged_at
    }

    /// Persists `events`: one lookup of the previous records, one evaluation
    /// per identity, then one ordered bulk write per operation kind.
    ///
    /// Rejected operations are logged and counted; they do not stop the rest
    /// of the batch. Only a failed lookup aborts the flush.
    #[tracing::instrument(skip(self, events, machine), fields(count = events.len()), level = "debug")]
    pub async fn flush(
        &mut self,
        events: Vec<(String, Event)>,
        machine: &StateMachine,
        now: DateTime<Utc>,
    ) -> Result<FlushReport, ArchiverError> {
        let events = collapse(events);
        let mut report = FlushReport { events: events.len(), ..Default::default() };
        if events.is_empty() {
            return Ok(report);
        }

        let logged_at = self.next_logged_at(now);
        let ids: Vec<String> = events.iter().map(|(id, _)| id.clone()).collect();
        let mut previous = self.store.find_by_ids(&ids).await?;

        let mut inserts: Vec<Document> = Vec::new();
        let mut updates: Vec<UpdateOperation> = Vec::new();
        let mut history: Vec<Document> = Vec::new();

        for (id, event) in events {
            let previous_state = PreviousState::classify(previous.remove(&id));
            if matches!(previous_state, PreviousState::Anomaly { .. }) {
                report.anomalies += 1;
            }

            let evaluation = match self.diff.evaluate(&id, event, &previous_state, machine, logged_at) {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    tracing::error!(id, error = %e, "Failed to evaluate event, dropping it.");
                    report.failed += 1;
                    continue;
                }
            };

            match evaluation.write {
                Some(CurrentStateWrite::Insert(document)) => inserts.push(document),
                Some(CurrentStateWrite::Update(operation)) => updates.push(operation),
                None => {}
            }
            if let Some(entry) = evaluation.history {
                history.push(entry.document);
            }
        }

        if let Some(written) = self.write(Collection::Events, inserts, &mut report).await {
            report.inserted += written;
        }
        if !updates.is_empty() {
            match self.store.update_many(updates).await {
                Ok(bulk) => {
                    log_failures(&bulk);
                    report.updated += bulk.written;
                    report.absorb(&bulk);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Bulk update of current-state records failed.");
                }
            }
        }
        self.write(Collection::EventsLog, history, &mut report).await;

        tracing::debug!(
            events = report.events,
            inserted = report.inserted,
            updated = report.updated,
            logged = report.logged,
            failed = report.failed,
            "Flushed events."
        );
        Ok(report)
    }

    /// Inserts `documents` into `collection`. Returns the number written, or
    /// `None` when nothing was attempted or the store failed as a whole.
    async fn write(
        &self,
        collection: Collection,
        documents: Vec<Document>,
        report: &mut FlushReport,
    ) -> Option<usize> {
        if documents.is_empty() {
            return None;
        }
        match self.store.insert_many(collection, documents).await {
            Ok(bulk) => {
                log_failures(&bulk);
                report.absorb(&bulk);
                Some(bulk.written)
            }
            Err(e) => {
                tracing::error!(collection = %collection, error = %e, "Bulk insert failed.");
                None
            }
        }
    }
}

/// Keeps the last event of each identity, at the position of its first
/// arrival.
fn collapse(events: Vec<(String, Event)>) -> Vec<(String, Event)> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(events.len());
    let mut collapsed: Vec<(String, Event)> = Vec::with_capacity(events.len());
    for (id, event) in events {
        match positions.get(&id) {
            Some(&position) => collapsed[position].1 = event,
            None => {
                positions.insert(id.clone(), collapsed.len());
                collapsed.push((id, event));
            }
        }
    }
    collapsed
}

/// Logs every operation rejected in a bulk write.
pub(crate) fn log_failures(report: &BulkWriteReport) {
    for failure in &report.failures {
        tracing::warn!(
            collection = %report.collection,
            index = failure.index,
            id = failure.id.as_deref().unwrap_or("<none>"),
            reason = %failure.reason,
            "Bulk write operation rejected."
        );
    }
}
