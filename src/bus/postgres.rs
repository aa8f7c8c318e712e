//! PostgreSQL-backed durable topic.
//!
//! Messages live in a single `probe_messages` table keyed by topic. The
//! subscriber claims batches in id order with `FOR UPDATE SKIP LOCKED`;
//! a claim that is never acknowledged becomes visible again once its
//! lease expires.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::bus::{Delivery, MessageBus, Subscription};
use crate::error::{AppError, Result};
use crate::models::BusConfig;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS probe_messages (
        id BIGSERIAL PRIMARY KEY,
        topic VARCHAR(255) NOT NULL,
        partition_key VARCHAR(255) NOT NULL,
        payload TEXT NOT NULL,
        status VARCHAR(16) NOT NULL DEFAULT 'pending',
        dead_letter_reason TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        claimed_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS probe_messages_topic_status_idx
        ON probe_messages (topic, status, id)
    "#,
];

/// Durable topic stored in Postgres.
#[derive(Clone)]
pub struct PgBus {
    pool: PgPool,
    settings: BusConfig,
}

impl PgBus {
    pub fn new(pool: PgPool, settings: &BusConfig) -> Self {
        Self {
            pool,
            settings: settings.clone(),
        }
    }

    /// Create the message table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBus for PgBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let payload = String::from_utf8(payload)
            .map_err(|e| AppError::publish(topic, format!("payload is not UTF-8: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO probe_messages (topic, partition_key, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(topic)
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::publish(topic, e))?;

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        Ok(Box::new(PgSubscription {
            pool: self.pool.clone(),
            topic: topic.to_string(),
            batch_size: i64::from(self.settings.batch_size),
            poll_interval: self.settings.poll_interval(),
            lease_secs: self.settings.claim_lease_secs as f64,
            buffer: VecDeque::new(),
        }))
    }
}

struct PgSubscription {
    pool: PgPool,
    topic: String,
    batch_size: i64,
    poll_interval: Duration,
    lease_secs: f64,
    buffer: VecDeque<Delivery>,
}

impl PgSubscription {
    /// Claim the next batch of pending (or lease-expired) messages.
    async fn claim(&self) -> Result<Vec<Delivery>> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            r#"
            WITH next_messages AS (
                SELECT id
                FROM probe_messages
                WHERE topic = $1
                  AND (
                    status = 'pending'
                    OR (status = 'claimed' AND claimed_at < NOW() - make_interval(secs => $3))
                  )
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE probe_messages
            SET status = 'claimed',
                claimed_at = NOW()
            WHERE id IN (SELECT id FROM next_messages)
            RETURNING id, partition_key, payload
            "#,
        )
        .bind(&self.topic)
        .bind(self.batch_size)
        .bind(self.lease_secs)
        .fetch_all(&self.pool)
        .await?;

        let mut deliveries: Vec<Delivery> = rows
            .into_iter()
            .map(|(id, key, payload)| Delivery {
                id,
                key,
                payload: payload.into_bytes(),
            })
            .collect();
        // RETURNING does not preserve the CTE order
        deliveries.sort_by_key(|d| d.id);
        Ok(deliveries)
    }
}

#[async_trait]
impl Subscription for PgSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Ok(Some(delivery));
            }

            let batch = self.claim().await?;
            if batch.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            } else {
                log::debug!("Claimed {} messages from '{}'", batch.len(), self.topic);
                self.buffer.extend(batch);
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE probe_messages
            SET status = 'done'
            WHERE id = $1
            "#,
        )
        .bind(delivery.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE probe_messages
            SET status = 'dead',
                dead_letter_reason = $2
            WHERE id = $1
            "#,
        )
        .bind(delivery.id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
