//! Best-effort message bus between execution contexts on one device.
//!
//! Delivery is fire-and-forget and at-least-once per live subscription. A
//! message published while nobody listens on a topic is dropped; that is not an
//! error from the publisher's point of view.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

const DEFAULT_TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
    #[error("bus transport error: {0}")]
    Transport(String),
    #[error("bus codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type BusResult<T> = Result<T, BusError>;

pub trait Bus: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage>;

    /// Publishes `payload` and returns how many subscriptions received it.
    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<usize>;
}

/// A decoded bus message together with the topic it arrived on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub topic: String,
    pub message: T,
}

/// JSON helpers layered over any [`Bus`] implementation.
pub trait BusExt: Bus {
    fn publish_json<T: Serialize>(&self, topic: &str, message: &T) -> BusResult<usize> {
        let bytes = serde_json::to_vec(message)?;
        self.publish(topic, Bytes::from(bytes))
    }
}

impl<B: Bus + ?Sized> BusExt for B {}

/// Decodes a JSON payload received from [`Bus::subscribe`].
pub fn decode_json<T: DeserializeOwned>(message: &BusMessage) -> BusResult<Envelope<T>> {
    let decoded = serde_json::from_slice(&message.payload)?;
    Ok(Envelope {
        topic: message.topic.clone(),
        message: decoded,
    })
}

/// In-process bus: one broadcast channel per topic.
#[derive(Debug)]
pub struct LocalBus {
    capacity: usize,
    topics: parking_lot::RwLock<std::collections::HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-topic buffer size. Slow subscribers that fall further behind than this
    /// observe `RecvError::Lagged` and skip ahead.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: parking_lot::RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.sender_for(topic).subscribe()
    }

    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<usize> {
        let sender = self.sender_for(topic);
        if sender.receiver_count() == 0 {
            return Ok(0);
        }
        sender
            .send(BusMessage {
                topic: topic.to_string(),
                payload,
            })
            .map_err(|_| BusError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload")]
    enum Ping {
        Ping { seq: u32 },
    }

    #[tokio::test]
    async fn local_bus_round_trip() {
        let bus = LocalBus::new();
        let mut sub = bus.subscribe("driftwood.sync.request");
        let delivered = bus
            .publish("driftwood.sync.request", Bytes::from_static(b"ping"))
            .expect("publish ok");
        assert_eq!(delivered, 1);
        let msg = sub.recv().await.expect("receive ok");
        assert_eq!(msg.topic, "driftwood.sync.request");
        assert_eq!(msg.payload, Bytes::from_static(b"ping"));
    }

    #[test]
    fn publish_without_listeners_is_dropped() {
        let bus = LocalBus::new();
        let delivered = bus
            .publish("driftwood.sync.status", Bytes::from_static(b"nobody"))
            .expect("publish ok");
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn every_subscription_gets_a_copy() {
        let bus = LocalBus::new();
        let mut first = bus.subscribe("status");
        let mut second = bus.subscribe("status");
        assert_eq!(bus.subscriber_count("status"), 2);

        bus.publish_json("status", &Ping::Ping { seq: 7 })
            .expect("publish ok");

        for rx in [&mut first, &mut second] {
            let msg = rx.recv().await.expect("receive ok");
            let env: Envelope<Ping> = decode_json(&msg).expect("decode");
            assert_eq!(env.topic, "status");
            assert_eq!(env.message, Ping::Ping { seq: 7 });
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = LocalBus::with_capacity(2);
        let mut rx = bus.subscribe("t");
        for seq in 0..4u32 {
            bus.publish_json("t", &Ping::Ping { seq }).expect("publish ok");
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        let msg = rx.recv().await.expect("receive after lag");
        let env: Envelope<Ping> = decode_json(&msg).expect("decode");
        assert_eq!(env.message, Ping::Ping { seq: 2 });
    }
}
