//! Message bus abstractions for probe outcomes.
//!
//! The producer and the consumer never share memory: the producer publishes
//! serialized outcomes to a topic and the consumer drains that topic.
//!
//! ## Delivery Lifecycle
//!
//! ```text
//! publish ──► pending ──► claimed ──┬──► done  (ack)
//!                                   └──► dead  (dead_letter)
//! ```
//!
//! Ordering is FIFO per topic for a single subscriber. Nothing is
//! deduplicated and delivery is not exactly-once.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::{DeadLetter, MemoryBus};
#[cfg(feature = "postgres")]
pub use postgres::PgBus;

/// A message handed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Bus-assigned id, increasing in publish order
    pub id: i64,
    /// Partition key given at publish time
    pub key: String,
    /// Raw message bytes
    pub payload: Vec<u8>,
}

/// Publishing side of a bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Hand a payload to a topic. Returns once the bus has accepted it.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;

    /// Open the single subscription for a topic.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>>;
}

/// Consuming side of a topic.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. `None` means the topic was closed.
    async fn next(&mut self) -> Result<Option<Delivery>>;

    /// Mark a message as processed.
    async fn ack(&mut self, delivery: &Delivery) -> Result<()>;

    /// Move a message to the dead-letter path with a reason.
    async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) -> Result<()>;
}
