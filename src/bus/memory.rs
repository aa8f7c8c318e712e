//! In-process message bus.
//!
//! Each topic is an unbounded tokio channel with a single subscriber.
//! Messages published before `subscribe` are buffered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::bus::{Delivery, MessageBus, Subscription};
use crate::error::{AppError, Result};

/// A message that was routed to the dead-letter path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub delivery: Delivery,
    pub reason: String,
}

struct Topic {
    sender: Option<mpsc::UnboundedSender<Delivery>>,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
    next_id: i64,
    acked: Vec<i64>,
    dead_letters: Vec<DeadLetter>,
}

impl Topic {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
            next_id: 1,
            acked: Vec::new(),
            dead_letters: Vec::new(),
        }
    }
}

/// Channel-backed bus shared by cloning.
#[derive(Clone, Default)]
pub struct MemoryBus {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop accepting messages on a topic.
    ///
    /// The subscriber still receives everything already published, then `None`.
    pub fn close(&self, topic: &str) {
        self.lock()
            .entry(topic.to_string())
            .or_insert_with(Topic::new)
            .sender = None;
    }

    /// Take every buffered message of a topic that has no subscriber.
    pub fn drain(&self, topic: &str) -> Vec<Delivery> {
        let mut topics = self.lock();
        let Some(receiver) = topics.get_mut(topic).and_then(|t| t.receiver.as_mut()) else {
            return Vec::new();
        };
        let mut drained = Vec::new();
        while let Ok(delivery) = receiver.try_recv() {
            drained.push(delivery);
        }
        drained
    }

    /// Ids acknowledged on a topic, in ack order.
    pub fn acked(&self, topic: &str) -> Vec<i64> {
        self.lock()
            .get(topic)
            .map(|t| t.acked.clone())
            .unwrap_or_default()
    }

    /// Messages dead-lettered on a topic, in order.
    pub fn dead_letters(&self, topic: &str) -> Vec<DeadLetter> {
        self.lock()
            .get(topic)
            .map(|t| t.dead_letters.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let mut topics = self.lock();
        let state = topics.entry(topic.to_string()).or_insert_with(Topic::new);
        let sender = state
            .sender
            .as_ref()
            .ok_or_else(|| AppError::publish(topic, "topic is closed"))?;

        let delivery = Delivery {
            id: state.next_id,
            key: key.to_string(),
            payload,
        };
        sender
            .send(delivery)
            .map_err(|_| AppError::publish(topic, "subscriber dropped"))?;
        state.next_id += 1;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let receiver = self
            .lock()
            .entry(topic.to_string())
            .or_insert_with(Topic::new)
            .receiver
            .take()
            .ok_or_else(|| AppError::bus(format!("topic '{topic}' already has a subscriber")))?;

        Ok(Box::new(MemorySubscription {
            topic: topic.to_string(),
            bus: self.clone(),
            receiver,
        }))
    }
}

struct MemorySubscription {
    topic: String,
    bus: MemoryBus,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        Ok(self.receiver.recv().await)
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        if let Some(topic) = self.bus.lock().get_mut(&self.topic) {
            topic.acked.push(delivery.id);
        }
        Ok(())
    }

    async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) -> Result<()> {
        if let Some(topic) = self.bus.lock().get_mut(&self.topic) {
            topic.dead_letters.push(DeadLetter {
                delivery: delivery.clone(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_delivery_after_close() {
        let bus = MemoryBus::new();
        bus.publish("t", "1", b"a".to_vec()).await.unwrap();
        bus.publish("t", "2", b"b".to_vec()).await.unwrap();
        bus.close("t");

        let mut sub = bus.subscribe("t").await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!((first.id, first.payload.as_slice()), (1, b"a".as_slice()));
        assert_eq!((second.id, second.key.as_str()), (2, "2"));
        assert!(sub.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_to_closed_topic_fails() {
        let bus = MemoryBus::new();
        bus.close("t");
        let err = bus.publish("t", "k", Vec::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Publish { .. }));
    }

    #[tokio::test]
    async fn test_single_subscriber() {
        let bus = MemoryBus::new();
        let _sub = bus.subscribe("t").await.unwrap();
        assert!(bus.subscribe("t").await.is_err());
    }

    #[tokio::test]
    async fn test_ack_and_dead_letter_are_recorded() {
        let bus = MemoryBus::new();
        bus.publish("t", "k", b"x".to_vec()).await.unwrap();
        bus.publish("t", "k", b"y".to_vec()).await.unwrap();

        let mut sub = bus.subscribe("t").await.unwrap();
        let good = sub.next().await.unwrap().unwrap();
        let bad = sub.next().await.unwrap().unwrap();
        sub.ack(&good).await.unwrap();
        sub.dead_letter(&bad, "broken").await.unwrap();

        assert_eq!(bus.acked("t"), vec![1]);
        let dead = bus.dead_letters("t");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].delivery.id, 2);
        assert_eq!(dead[0].reason, "broken");
    }

    #[tokio::test]
    async fn test_drain_without_subscriber() {
        let bus = MemoryBus::new();
        bus.publish("t", "k", b"x".to_vec()).await.unwrap();
        assert_eq!(bus.drain("t").len(), 1);
        assert!(bus.drain("t").is_empty());
        assert!(bus.drain("other").is_empty());
    }
}
