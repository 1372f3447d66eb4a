//! Timer-driven resolution of stealthy records.
//!
//! A stealthy record only resolves on its own when a new event arrives for
//! it. The sweep resolves the ones whose display delay elapsed without a
//! follow-up, writes the new status and re-publishes the record marked with
//! `pass_status` so the event path does not recompute it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{error::ArchiverError, persister::log_failures, state_machine::StateMachine};
use crate::{
    models::{AlarmRecord, AlarmStatus, Document, routing::routing_key},
    persistence::{EventStore, UpdateOperation},
    publisher::EventPublisher,
};

/// Counters of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stealthy records examined.
    pub scanned: usize,
    /// Records whose status was resolved.
    pub resolved: usize,
    /// Resolved records published back to the bus.
    pub published: usize,
}

/// Periodic pass over stealthy records.
#[derive(Debug)]
pub struct ExpirySweeper {
    exchange: String,
    config_refresh: Duration,
    last_refresh: Option<DateTime<Utc>>,
}

impl ExpirySweeper {
    /// Creates a sweeper publishing on `exchange` that re-reads the stored
    /// status configuration at most once every `config_refresh`.
    pub fn new(exchange: impl Into<String>, config_refresh: Duration) -> Self {
        Self { exchange: exchange.into(), config_refresh, last_refresh: None }
    }

    /// Whether the stored configuration should be re-read at `now`. The
    /// first call is always due.
    pub fn is_refresh_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_refresh {
            None => true,
            Some(last) => now
                .signed_duration_since(last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.config_refresh),
        }
    }

    /// Refreshes the status configuration when due, then resolves every
    /// stealthy record whose display delay elapsed at `now`.
    #[tracing::instrument(skip(self, store, publisher, machine), level = "debug")]
    pub async fn sweep<S: EventStore + ?Sized>(
        &mut self,
        store: &S,
        publisher: &dyn EventPublisher,
        machine: &mut StateMachine,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, ArchiverError> {
        if self.is_refresh_due(now) {
            self.last_refresh = Some(now);
            refresh_config(store, machine).await;
        }

        let documents = store.find_by_status(AlarmStatus::Stealthy).await?;
        let mut report = SweepReport { scanned: documents.len(), ..Default::default() };

        let mut resolved = Vec::new();
        for document in documents {
            let mut record = match AlarmRecord::from_document(&document) {
                Ok(record) => record,
                Err(e) => {
                    let id = document.get("_id").and_then(Value::as_str).unwrap_or("<none>");
                    tracing::warn!(
                        id,
                        error = %e,
                        "Skipping malformed stealthy record."
                    );
                    continue;
                }
            };
            if let Some(lifecycle) = machine.resolve_stealthy(&record, now.timestamp()) {
                record.apply_lifecycle(lifecycle);
                resolved.push(record);
            }
        }
        if resolved.is_empty() {
            return Ok(report);
        }

        let operations = resolved
            .iter()
            .map(|record| UpdateOperation { id: record.id.clone(), changes: resolution(record) })
            .collect();
        let bulk = store.update_many(operations).await?;
        log_failures(&bulk);
        report.resolved = bulk.written;

        for record in &resolved {
            tracing::info!(id = %record.id, status = %record.status, "Resolved stealthy record.");
            match self.publish(publisher, record).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    tracing::error!(id = %record.id, error = %e, "Failed to publish resolved record.")
                }
            }
        }
        Ok(report)
    }

    async fn publish(
        &self,
        publisher: &dyn EventPublisher,
        record: &AlarmRecord,
    ) -> Result<(), ArchiverError> {
        let mut payload = record.to_document()?;
        payload.insert("pass_status".to_string(), Value::from(1));
        let body = serde_json::to_vec(&payload)?;

        let routing_key = record
            .event
            .rk
            .clone()
            .or_else(|| routing_key(&record.event))
            .unwrap_or_else(|| record.id.clone());
        publisher.publish(&self.exchange, &routing_key, &body).await?;
        Ok(())
    }
}

/// The fields a resolution writes.
fn resolution(record: &AlarmRecord) -> Document {
    let mut changes = Document::new();
    changes.insert("status".to_string(), Value::from(record.status.code()));
    changes.insert("ts_first_stealthy".to_string(), Value::from(record.ts_first_stealthy));
    changes
}

/// Merges the stored configuration document into the machine's thresholds.
/// On failure the current thresholds stay in effect.
async fn refresh_config<S: EventStore + ?Sized>(store: &S, machine: &mut StateMachine) {
    match store.get_status_config().await {
        Ok(Some(document)) => {
            let updated = machine.config().merged_with(&document);
            if updated != *machine.config() {
                tracing::info!(config = ?updated, "Status configuration updated.");
                machine.set_config(updated);
            }
        }
        Ok(None) => tracing::debug!("No stored status configuration, keeping current values."),
        Err(e) => tracing::warn!(
            error = %e,
            "Failed to fetch status configuration, keeping current values."
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::{
        config::StatusConfig,
        persistence::{BulkWriteReport, Collection, PersistenceError, traits::MockEventStore},
        publisher::MockEventPublisher,
        test_helpers::AlarmRecordBuilder,
    };

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn stealthy(id: &str, state: u32, since: i64) -> Document {
        AlarmRecordBuilder::new(id)
            .state(state)
            .status(AlarmStatus::Stealthy)
            .ts_first_stealthy(since)
            .rk(id)
            .build()
            .to_document()
            .unwrap()
    }

    fn written(operations: Vec<UpdateOperation>) -> Result<BulkWriteReport, PersistenceError> {
        let mut report = BulkWriteReport::new(Collection::Events, operations.len());
        report.written = operations.len();
        Ok(report)
    }

    #[tokio::test]
    async fn test_sweep_resolves_elapsed_records() {
        let mut store = MockEventStore::new();
        store.expect_get_status_config().returning(|| Ok(None));
        store.expect_find_by_status().withf(|status| *status == AlarmStatus::Stealthy).returning(
            |_| Ok(vec![stealthy("alert", 2, 1_000), stealthy("ok", 0, 1_000), stealthy("young", 1, 1_200)]),
        );
        store
            .expect_update_many()
            .withf(|operations| {
                operations.len() == 2
                    && operations[0].id == "alert"
                    && operations[0].changes.get("status") == Some(&json!(1))
                    && operations[1].id == "ok"
                    && operations[1].changes.get("status") == Some(&json!(0))
                    && operations[1].changes.get("ts_first_stealthy") == Some(&json!(0))
            })
            .times(1)
            .returning(written);

        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|exchange, routing_key, payload| {
                let payload: Value = serde_json::from_slice(payload).unwrap();
                let routing_key = routing_key.to_string();
                exchange.to_string() == "canopsis.events"
                    && (routing_key == "alert" || routing_key == "ok")
                    && payload.get("pass_status") == Some(&json!(1))
            })
            .times(2)
            .returning(|_, _, _| Ok(()));

        let mut sweeper = ExpirySweeper::new("canopsis.events", Duration::from_secs(60));
        let mut machine = StateMachine::new(StatusConfig::default());

        let report = sweeper.sweep(&store, &publisher, &mut machine, at(1_360)).await.unwrap();

        assert_eq!(report, SweepReport { scanned: 3, resolved: 2, published: 2 });
    }

    #[tokio::test]
    async fn test_sweep_refreshes_configuration() {
        let mut store = MockEventStore::new();
        store.expect_get_status_config().returning(|| {
            Ok(Some(json!({"stealthy_show": 60, "bagot_freq": 4}).as_object().cloned().unwrap()))
        });
        store.expect_find_by_status().returning(|_| Ok(vec![stealthy("a", 1, 1_000)]));
        store.expect_update_many().times(1).returning(written);

        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().times(1).returning(|_, _, _| Ok(()));

        let mut sweeper = ExpirySweeper::new("events", Duration::from_secs(60));
        let mut machine = StateMachine::new(StatusConfig::default());

        let report = sweeper.sweep(&store, &publisher, &mut machine, at(1_060)).await.unwrap();

        assert_eq!(report.resolved, 1);
        assert_eq!(machine.config().stealthy_show, 60);
        assert_eq!(machine.config().bagot_freq, 4);
        assert_eq!(machine.config().bagot_time, 3600);
    }

    #[tokio::test]
    async fn test_config_fetch_failure_keeps_current_values() {
        let mut store = MockEventStore::new();
        store
            .expect_get_status_config()
            .returning(|| Err(PersistenceError::OperationFailed("no such table".into())));
        store.expect_find_by_status().returning(|_| Ok(vec![]));
        store.expect_update_many().never();

        let publisher = MockEventPublisher::new();
        let config = StatusConfig { stealthy_show: 30, ..StatusConfig::default() };
        let mut machine = StateMachine::new(config);
        let mut sweeper = ExpirySweeper::new("events", Duration::from_secs(60));

        let report = sweeper.sweep(&store, &publisher, &mut machine, at(100)).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert_eq!(*machine.config(), config);
    }

    #[tokio::test]
    async fn test_publish_failure_is_contained() {
        let mut store = MockEventStore::new();
        store.expect_get_status_config().returning(|| Ok(None));
        store.expect_find_by_status().returning(|_| Ok(vec![stealthy("a", 1, 0)]));
        store.expect_update_many().times(1).returning(written);

        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().times(1).returning(|_, _, _| {
            Err(crate::publisher::PublisherError::Serialization(
                serde_json::from_str::<Value>("{").unwrap_err(),
            ))
        });

        let mut sweeper = ExpirySweeper::new("events", Duration::from_secs(60));
        let mut machine = StateMachine::new(StatusConfig::default());

        let report = sweeper.sweep(&store, &publisher, &mut machine, at(1_000)).await.unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.published, 0);
    }

    #[tokio::test]
    async fn test_malformed_stealthy_record_is_skipped() {
        let mut store = MockEventStore::new();
        store.expect_get_status_config().returning(|| Ok(None));
        store.expect_find_by_status().returning(|_| {
            let broken = json!({"_id": "broken", "status": 2}).as_object().cloned().unwrap();
            Ok(vec![broken, stealthy("a", 1, 0)])
        });
        store
            .expect_update_many()
            .withf(|operations| operations.len() == 1 && operations[0].id == "a")
            .times(1)
            .returning(written);

        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().times(1).returning(|_, _, _| Ok(()));

        let mut sweeper = ExpirySweeper::new("events", Duration::from_secs(60));
        let mut machine = StateMachine::new(StatusConfig::default());

        let report = sweeper.sweep(&store, &publisher, &mut machine, at(1_000)).await.unwrap();
        assert_eq!(report, SweepReport { scanned: 2, resolved: 1, published: 1 });
    }

    #[tokio::test]
    async fn test_every_sweep_scans_but_config_refresh_is_gated() {
        let mut store = MockEventStore::new();
        store.expect_get_status_config().times(2).returning(|| Ok(None));
        store.expect_find_by_status().times(4).returning(|_| Ok(vec![]));

        let publisher = MockEventPublisher::new();
        let mut sweeper = ExpirySweeper::new("events", Duration::from_secs(60));
        let mut machine = StateMachine::new(StatusConfig::default());

        for secs in [100, 101, 159, 160] {
            sweeper.sweep(&store, &publisher, &mut machine, at(secs)).await.unwrap();
        }
        assert!(!sweeper.is_refresh_due(at(219)));
        assert!(sweeper.is_refresh_due(at(220)));
    }
}
