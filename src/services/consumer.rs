// src/services/consumer.rs

//! Result consumer service.
//!
//! Drains the results topic and writes each message as one `probe_results`
//! row plus one `regex_probe_results` row per verdict. Messages that cannot
//! be decoded or persisted are dead-lettered so the stream keeps moving.

use std::sync::Arc;

use chrono::Utc;

use crate::bus::{Delivery, MessageBus, Subscription};
use crate::error::Result;
use crate::models::ProbeMessage;
use crate::storage::ResultStore;

/// What happened to one consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Persisted,
    DeadLettered,
}

/// Totals for one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub persisted: u64,
    pub dead_lettered: u64,
}

/// Consumer bound to a single topic subscription.
pub struct ResultConsumer {
    subscription: Box<dyn Subscription>,
    store: Arc<dyn ResultStore>,
    stats: ConsumerStats,
}

impl ResultConsumer {
    pub fn new(subscription: Box<dyn Subscription>, store: Arc<dyn ResultStore>) -> Self {
        Self {
            subscription,
            store,
            stats: ConsumerStats::default(),
        }
    }

    /// Subscribe to `topic` on `bus` and wrap the subscription.
    pub async fn subscribe(
        bus: &dyn MessageBus,
        topic: &str,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self> {
        let subscription = bus.subscribe(topic).await?;
        log::info!("Subscribed to topic '{}'", topic);
        Ok(Self::new(subscription, store))
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Process messages until the topic closes.
    ///
    /// Against a long-lived bus this never returns on its own; callers stop
    /// it by dropping the future. An error from the bus itself is fatal.
    pub async fn run(&mut self) -> Result<ConsumerStats> {
        while let Some(delivery) = self.subscription.next().await? {
            self.process(&delivery).await?;
        }

        log::info!(
            "Topic closed: {} persisted, {} dead-lettered",
            self.stats.persisted,
            self.stats.dead_lettered
        );
        Ok(self.stats)
    }

    /// Decode, persist and acknowledge one delivery.
    pub async fn process(&mut self, delivery: &Delivery) -> Result<Disposition> {
        let message = match ProbeMessage::decode(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                log::error!("Message {} (key {}) rejected: {}", delivery.id, delivery.key, e);
                return self.reject(delivery, &e.to_string()).await;
            }
        };

        let site_id = message.site_id;
        let record = message.into_record(Utc::now());
        if let Err(e) = self.store.persist(&record).await {
            log::error!("Persisting result for site {} failed: {}", site_id, e);
            return self.reject(delivery, &e.to_string()).await;
        }

        self.subscription.ack(delivery).await?;
        self.stats.persisted += 1;
        log::debug!(
            "Stored result for site {} (up: {}, {} regex results)",
            site_id,
            record.up,
            record.regex_results.len()
        );
        Ok(Disposition::Persisted)
    }

    async fn reject(&mut self, delivery: &Delivery, reason: &str) -> Result<Disposition> {
        self.subscription.dead_letter(delivery, reason).await?;
        self.stats.dead_lettered += 1;
        Ok(Disposition::DeadLettered)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::bus::MemoryBus;
    use crate::error::AppError;
    use crate::models::ProbeRecord;
    use crate::storage::MemoryStore;

    const TOPIC: &str = "probe-results";

    /// Store that refuses records for one site.
    struct FailingStore {
        failing_site: i32,
        inner: MemoryStore,
    }

    #[async_trait]
    impl ResultStore for FailingStore {
        async fn persist(&self, record: &ProbeRecord) -> Result<()> {
            if record.site_id == self.failing_site {
                return Err(AppError::validation("site was deleted"));
            }
            self.inner.persist(record).await
        }
    }

    async fn publish_all(bus: &MemoryBus, payloads: &[&str]) {
        for payload in payloads {
            bus.publish(TOPIC, "k", payload.as_bytes().to_vec())
                .await
                .unwrap();
        }
        bus.close(TOPIC);
    }

    #[tokio::test]
    async fn test_message_becomes_probe_and_regex_rows() {
        let bus = MemoryBus::new();
        let store = MemoryStore::new();
        publish_all(
            &bus,
            &[r#"{"site_id": 7, "status_code": 200, "regex_results": [[3, true], [4, false]]}"#],
        )
        .await;

        let mut consumer = ResultConsumer::subscribe(&bus, TOPIC, Arc::new(store.clone()))
            .await
            .unwrap();
        let stats = consumer.run().await.unwrap();

        assert_eq!(stats.persisted, 1);
        let probes = store.probe_results();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].associated_site_id, 7);
        assert!(probes[0].up);

        let regexes = store.regex_results();
        let found: Vec<(i32, bool)> = regexes
            .iter()
            .map(|r| (r.associated_regex_id, r.found))
            .collect();
        assert_eq!(found, vec![(3, true), (4, false)]);
        assert!(regexes.iter().all(|r| r.timestamp == probes[0].timestamp));
        assert_eq!(bus.acked(TOPIC), vec![1]);
    }

    #[tokio::test]
    async fn test_down_statuses_are_stored_as_not_up() {
        let bus = MemoryBus::new();
        let store = MemoryStore::new();
        publish_all(
            &bus,
            &[
                r#"{"site_id": 1, "status_code": 500, "regex_results": []}"#,
                r#"{"site_id": 2, "status_code": -1, "regex_results": []}"#,
                r#"{"site_id": 3, "status_code": 301, "regex_results": []}"#,
            ],
        )
        .await;

        let mut consumer = ResultConsumer::subscribe(&bus, TOPIC, Arc::new(store.clone()))
            .await
            .unwrap();
        consumer.run().await.unwrap();

        let probes = store.probe_results();
        assert_eq!(probes.len(), 3);
        assert!(probes.iter().all(|p| !p.up));
        assert!(store.regex_results().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_message_is_dead_lettered_and_stream_continues() {
        let bus = MemoryBus::new();
        let store = MemoryStore::new();
        publish_all(
            &bus,
            &[
                "not json",
                r#"{"site_id": 1, "status_code": 404, "regex_results": [[1, true]]}"#,
                r#"{"site_id": 2, "status_code": 200, "regex_results": [[5, true]]}"#,
            ],
        )
        .await;

        let mut consumer = ResultConsumer::subscribe(&bus, TOPIC, Arc::new(store.clone()))
            .await
            .unwrap();
        let stats = consumer.run().await.unwrap();

        assert_eq!(
            stats,
            ConsumerStats {
                persisted: 1,
                dead_lettered: 2
            }
        );
        let dead: Vec<i64> = bus
            .dead_letters(TOPIC)
            .iter()
            .map(|d| d.delivery.id)
            .collect();
        assert_eq!(dead, vec![1, 2]);
        assert_eq!(bus.acked(TOPIC), vec![3]);
        assert_eq!(store.probe_results()[0].associated_site_id, 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_dead_lettered() {
        let bus = MemoryBus::new();
        let store = MemoryStore::new();
        publish_all(
            &bus,
            &[
                r#"{"site_id": 9, "status_code": 200, "regex_results": []}"#,
                r#"{"site_id": 10, "status_code": 200, "regex_results": []}"#,
            ],
        )
        .await;

        let failing = FailingStore {
            failing_site: 9,
            inner: store.clone(),
        };
        let mut consumer = ResultConsumer::subscribe(&bus, TOPIC, Arc::new(failing))
            .await
            .unwrap();
        let stats = consumer.run().await.unwrap();

        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.persisted, 1);
        let dead = bus.dead_letters(TOPIC);
        assert!(dead[0].reason.contains("site was deleted"));
        assert_eq!(store.probe_results().len(), 1);
    }

    #[tokio::test]
    async fn test_process_reports_disposition() {
        let bus = MemoryBus::new();
        let store = MemoryStore::new();
        let subscription = bus.subscribe(TOPIC).await.unwrap();
        let mut consumer = ResultConsumer::new(subscription, Arc::new(store));

        let good = Delivery {
            id: 1,
            key: "4".into(),
            payload: br#"{"site_id": 4, "status_code": 204, "regex_results": []}"#.to_vec(),
        };
        let bad = Delivery {
            id: 2,
            key: "4".into(),
            payload: vec![0xff, 0xfe],
        };

        assert_eq!(consumer.process(&good).await.unwrap(), Disposition::Persisted);
        assert_eq!(consumer.process(&bad).await.unwrap(), Disposition::DeadLettered);
        assert_eq!(consumer.stats().persisted, 1);
    }
}
