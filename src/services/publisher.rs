// src/services/publisher.rs

//! Result publisher service.
//!
//! Serializes outcomes into `ProbeMessage`s and hands them to the bus topic,
//! keyed by site id. A send is acknowledged by the bus before `publish`
//! returns; anything that could not be sent is counted as dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::bus::MessageBus;
use crate::error::Result;
use crate::models::{BusConfig, ProbeMessage, ProbeOutcome};

/// Upper bound for the wait between publish attempts.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Wait before the attempt after one that waited `current`.
fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_RETRY_BACKOFF)
}

/// Running totals of publish attempts.
#[derive(Debug, Default)]
pub struct PublishStats {
    published: AtomicU64,
    dropped: AtomicU64,
}

impl PublishStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Publishes probe outcomes to a single topic.
pub struct ResultPublisher {
    bus: Arc<dyn MessageBus>,
    topic: String,
    retries: u32,
    backoff: Duration,
    stats: PublishStats,
}

impl ResultPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, settings: &BusConfig) -> Self {
        Self {
            bus,
            topic: settings.topic.clone(),
            retries: settings.publish_retries,
            backoff: settings.retry_backoff().min(MAX_RETRY_BACKOFF),
            stats: PublishStats::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn stats(&self) -> &PublishStats {
        &self.stats
    }

    /// Send one outcome.
    ///
    /// With `publish_retries = 0` this is a single attempt. On failure the
    /// drop is counted and the error returned to the caller.
    pub async fn publish(&self, outcome: &ProbeOutcome) -> Result<()> {
        match self.send(outcome).await {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn send(&self, outcome: &ProbeOutcome) -> Result<()> {
        let payload = ProbeMessage::from(outcome).encode()?;
        let key = outcome.site_id.to_string();

        let mut attempt = 0;
        let mut backoff = self.backoff;
        loop {
            match self.bus.publish(&self.topic, &key, payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    log::debug!(
                        "Publish for site {} failed (attempt {}/{}): {}",
                        outcome.site_id,
                        attempt,
                        self.retries + 1,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
