use std::sync::Arc;

use driftwood_proto::{SyncMessage, TOPIC_SYNC_STATUS, UpdateReason};
use transport_bus::{Bus, BusExt, BusResult};

/// Topics the coordinator publishes on.
pub const PUBLISH_TOPICS: &[&str] = &[TOPIC_SYNC_STATUS];

/// Coordinator-side publisher for status broadcasts to every foreground instance.
#[derive(Clone)]
pub struct StatusPublisher {
    bus: Arc<dyn Bus>,
}

impl StatusPublisher {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    pub fn publish_update(&self, reason: UpdateReason) -> BusResult<usize> {
        self.publish(SyncMessage::SyncUpdate { reason })
    }

    pub fn publish_completed(&self, timestamp: i64) -> BusResult<usize> {
        self.publish(SyncMessage::SyncCompleted { timestamp })
    }

    pub fn publish_failed(&self, error: impl Into<String>) -> BusResult<usize> {
        self.publish(SyncMessage::SyncFailed {
            error: error.into(),
        })
    }

    fn publish(&self, message: SyncMessage) -> BusResult<usize> {
        self.bus.publish_json(TOPIC_SYNC_STATUS, &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport_bus::{LocalBus, decode_json};

    #[tokio::test]
    async fn publishes_adjacently_tagged_status() {
        let bus = Arc::new(LocalBus::new());
        let mut sub = bus.subscribe(TOPIC_SYNC_STATUS);
        let publisher = StatusPublisher::new(bus.clone());
        assert_eq!(publisher.publish_completed(1_234).unwrap(), 1);

        let msg = sub.recv().await.unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(raw["type"], "SYNC_COMPLETED");
        assert_eq!(raw["payload"]["timestamp"], 1_234);
        let envelope = decode_json::<SyncMessage>(&msg).unwrap();
        assert_eq!(envelope.topic, TOPIC_SYNC_STATUS);
    }

    #[test]
    fn publishing_without_listeners_is_not_an_error() {
        let publisher = StatusPublisher::new(Arc::new(LocalBus::new()));
        assert_eq!(publisher.publish_failed("quota").unwrap(), 0);
    }
}
