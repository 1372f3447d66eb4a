//! The archiver: owns the buffer and decision logic and exposes the entry
//! points called by the host.

use std::sync::Arc;

use super::{
    builder::ArchiverBuilder,
    error::ArchiverError,
    ingest_buffer::IngestBuffer,
    persister::{BatchPersister, FlushReport},
    state_machine::StateMachine,
    sweeper::{ExpirySweeper, SweepReport},
};
use crate::{
    models::{Event, HistoryEntry},
    persistence::EventStore,
    publisher::EventPublisher,
    time_source::TimeSource,
};

/// Counters accumulated between two ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiverStats {
    /// Current-state documents inserted.
    pub inserted: usize,
    /// Current-state documents updated.
    pub updated: usize,
    /// History entries appended.
    pub logged: usize,
    /// Malformed previous records met while flushing.
    pub anomalies: usize,
    /// Rejected or dropped operations.
    pub failed: usize,
    /// Stealthy records resolved by the sweep.
    pub resolved: usize,
}

impl ArchiverStats {
    fn record_flush(&mut self, report: &FlushReport) {
        self.inserted += report.inserted;
        self.updated += report.updated;
        self.logged += report.logged;
        self.anomalies += report.anomalies;
        self.failed += report.failed;
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Set when the buffer was flushed because the bulk delay elapsed.
    pub flush: Option<FlushReport>,
    /// Set when the expiry sweep ran.
    pub sweep: Option<SweepReport>,
}

/// Reduces a stream of events to current-state records and a history log.
///
/// Calls are expected to be serialized by the host: `on_event` and `on_tick`
/// take `&mut self` and a flush runs to completion before the next call.
pub struct Archiver<S: EventStore + ?Sized> {
    store: Arc<S>,
    publisher: Arc<dyn EventPublisher>,
    time_source: Arc<dyn TimeSource>,
    machine: StateMachine,
    buffer: IngestBuffer,
    persister: BatchPersister<S>,
    sweeper: ExpirySweeper,
    stats: ArchiverStats,
}

impl<S: EventStore + ?Sized> Archiver<S> {
    /// Returns a new `ArchiverBuilder`.
    pub fn builder() -> ArchiverBuilder<S> {
        ArchiverBuilder::new()
    }

    pub(super) fn new(
        store: Arc<S>,
        publisher: Arc<dyn EventPublisher>,
        time_source: Arc<dyn TimeSource>,
        machine: StateMachine,
        buffer: IngestBuffer,
        sweeper: ExpirySweeper,
    ) -> Self {
        Self {
            persister: BatchPersister::new(Arc::clone(&store)),
            store,
            publisher,
            time_source,
            machine,
            buffer,
            sweeper,
            stats: ArchiverStats::default(),
        }
    }

    /// Buffers `event` under `id` and flushes when the batch is full or the
    /// bulk delay elapsed. Returns the report of the flush, if one ran.
    pub async fn on_event(&mut self, id: String, event: Event) -> Option<FlushReport> {
        let now = self.time_source.now();
        tracing::debug!(id = %id, state = event.state, "Buffering event.");
        if self.buffer.accept(id, event, now) { self.flush().await } else { None }
    }

    /// Periodic entry point: flushes a buffer that waited long enough, sweeps
    /// stealthy records, then logs the statistics gathered since the previous
    /// tick.
    pub async fn on_tick(&mut self) -> TickReport {
        let now = self.time_source.now();
        let mut report = TickReport::default();

        if !self.buffer.is_empty() && self.buffer.is_due(now) {
            report.flush = self.flush().await;
        }

        match self
            .sweeper
            .sweep(self.store.as_ref(), self.publisher.as_ref(), &mut self.machine, now)
            .await
        {
            Ok(sweep) => {
                self.stats.resolved += sweep.resolved;
                report.sweep = Some(sweep);
            }
            Err(e) => tracing::error!(error = %e, "Expiry sweep failed."),
        }

        self.log_stats();
        report
    }

    /// Persists everything buffered. Returns `None` when the buffer was empty
    /// or the flush failed.
    pub async fn flush(&mut self) -> Option<FlushReport> {
        let now = self.time_source.now();
        let events = self.buffer.flush(now);
        if events.is_empty() {
            return None;
        }

        match self.persister.flush(events, &self.machine, now).await {
            Ok(report) => {
                self.stats.record_flush(&report);
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to flush buffered events.");
                None
            }
        }
    }

    /// The history entries logged for `id`, oldest first.
    pub async fn history(&self, id: &str) -> Result<Vec<HistoryEntry>, ArchiverError> {
        let documents = self.store.find_history(id).await?;
        Ok(documents.into_iter().filter_map(HistoryEntry::from_document).collect())
    }

    /// Removes every current-state record and history entry.
    pub async fn remove_all(&self) -> Result<(), ArchiverError> {
        self.store.drop_all().await?;
        Ok(())
    }

    /// The state machine in effect.
    pub fn state_machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Number of identities waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Statistics gathered since the last tick.
    pub fn stats(&self) -> &ArchiverStats {
        &self.stats
    }

    fn log_stats(&mut self) {
        let stats = std::mem::take(&mut self.stats);
        if stats.is_empty() {
            return;
        }
        tracing::info!(
            inserted = stats.inserted,
            updated = stats.updated,
            logged = stats.logged,
            anomalies = stats.anomalies,
            failed = stats.failed,
            resolved = stats.resolved,
            "Archiver statistics."
        );
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        config::{ArchiverSettings, StatusConfig},
        persistence::{BulkWriteReport, traits::MockEventStore},
        publisher::MockEventPublisher,
        test_helpers::{EventBuilder, ManualTimeSource},
    };

    fn clock() -> Arc<ManualTimeSource> {
        Arc::new(ManualTimeSource::new(Utc.timestamp_opt(1_400_000_000, 0).unwrap()))
    }

    fn settings(bulk_amount: usize) -> ArchiverSettings {
        ArchiverSettings { bulk_amount, ..ArchiverSettings::default() }
    }

    fn accepting_store() -> MockEventStore {
        let mut store = MockEventStore::new();
        store.expect_find_by_ids().returning(|_| Ok(HashMap::new()));
        store.expect_insert_many().returning(|collection, documents| {
            let mut report = BulkWriteReport::new(collection, documents.len());
            report.written = documents.len();
            Ok(report)
        });
        store.expect_get_status_config().returning(|| Ok(None));
        store.expect_find_by_status().returning(|_| Ok(vec![]));
        store
    }

    fn archiver(
        store: MockEventStore,
        clock: Arc<ManualTimeSource>,
        bulk_amount: usize,
    ) -> Archiver<MockEventStore> {
        Archiver::builder()
            .store(Arc::new(store))
            .publisher(Arc::new(MockEventPublisher::new()))
            .time_source(clock)
            .settings(settings(bulk_amount))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_size_trigger_flushes_once() {
        let clock = clock();
        let mut archiver = archiver(accepting_store(), Arc::clone(&clock), 3);

        assert!(archiver.on_event("a".into(), EventBuilder::new().state(1).build()).await.is_none());
        assert!(archiver.on_event("b".into(), EventBuilder::new().state(1).build()).await.is_none());
        assert!(archiver.on_event("a".into(), EventBuilder::new().state(2).build()).await.is_none());

        let report = archiver.on_event("c".into(), EventBuilder::new().state(0).build()).await.unwrap();
        assert_eq!(report.events, 3);
        assert_eq!(report.inserted, 3);
        assert_eq!(archiver.buffered(), 0);
        assert_eq!(archiver.stats().inserted, 3);
    }

    #[tokio::test]
    async fn test_tick_flushes_after_bulk_delay() {
        let clock = clock();
        let mut archiver = archiver(accepting_store(), Arc::clone(&clock), 500);

        for i in 0..10 {
            archiver.on_event(format!("id-{i}"), EventBuilder::new().state(1).build()).await;
        }

        let early = archiver.on_tick().await;
        assert!(early.flush.is_none());
        assert!(early.sweep.is_some());

        clock.advance(Duration::from_secs(3));
        let report = archiver.on_tick().await;
        assert_eq!(report.flush.map(|flush| flush.inserted), Some(10));
        assert!(report.sweep.is_some());
        // Statistics are reset once logged.
        assert_eq!(*archiver.stats(), ArchiverStats::default());
    }

    #[tokio::test]
    async fn test_every_tick_sweeps_and_config_is_refreshed_on_interval() {
        let clock = clock();
        let mut store = MockEventStore::new();
        store.expect_get_status_config().times(2).returning(|| Ok(None));
        store.expect_find_by_status().times(3).returning(|_| Ok(vec![]));
        let mut archiver = archiver(store, Arc::clone(&clock), 500);

        assert!(archiver.on_tick().await.sweep.is_some());
        clock.advance(Duration::from_secs(30));
        assert!(archiver.on_tick().await.sweep.is_some());
        clock.advance(Duration::from_secs(30));
        assert!(archiver.on_tick().await.sweep.is_some());
    }

    #[tokio::test]
    async fn test_failed_flush_is_contained() {
        let mut store = MockEventStore::new();
        store.expect_find_by_ids().returning(|_| {
            Err(crate::persistence::PersistenceError::OperationFailed("disk I/O error".into()))
        });
        let mut archiver = archiver(store, clock(), 1);

        let report = archiver.on_event("a".into(), EventBuilder::new().state(1).build()).await;
        assert!(report.is_none());
        assert_eq!(archiver.buffered(), 0);
    }

    #[tokio::test]
    async fn test_history_decodes_entries() {
        let mut store = MockEventStore::new();
        store.expect_find_history().withf(|id| id.to_string() == "a").returning(|_| {
            Ok(vec![
                serde_json::json!({"_id": "a.1.000000", "event_id": "a", "state": 1})
                    .as_object()
                    .cloned()
                    .unwrap(),
                serde_json::json!({"state": 2}).as_object().cloned().unwrap(),
            ])
        });
        let archiver = archiver(store, clock(), 10);

        let history = archiver.history("a").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "a.1.000000");
    }

    #[tokio::test]
    async fn test_remove_all() {
        let mut store = MockEventStore::new();
        store.expect_drop_all().times(1).returning(|| Ok(()));
        let archiver = archiver(store, clock(), 10);

        archiver.remove_all().await.unwrap();
    }

    #[test]
    fn test_builder_uses_status_config() {
        let config = StatusConfig { bagot_freq: 3, ..StatusConfig::default() };
        let archiver: Archiver<MockEventStore> = Archiver::builder()
            .store(Arc::new(MockEventStore::new()))
            .publisher(Arc::new(MockEventPublisher::new()))
            .status_config(config)
            .build()
            .unwrap();
        assert_eq!(archiver.state_machine().config().bagot_freq, 3);
    }
}
