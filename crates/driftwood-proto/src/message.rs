use serde::{Deserialize, Serialize};

use crate::payload::ReplicatedPayload;

/// Foreground instances -> coordinator.
pub const TOPIC_SYNC_REQUEST: &str = "driftwood.sync.request";
/// Coordinator -> every foreground instance.
pub const TOPIC_SYNC_STATUS: &str = "driftwood.sync.status";

pub const SYNC_TOPICS: &[&str] = &[TOPIC_SYNC_REQUEST, TOPIC_SYNC_STATUS];

/// Closed set of messages exchanged between the coordinator and foreground
/// instances. Encoded as `{"type": "SYNC_REQUEST", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    /// A foreground instance finished its initial reconciliation.
    #[serde(rename_all = "camelCase")]
    SyncInited { instance_id: String },
    /// Full snapshot to be coalesced into the next replicated write.
    SyncRequest { data: ReplicatedPayload },
    /// The replicated payload may have changed; re-run reconciliation.
    SyncUpdate { reason: UpdateReason },
    /// A flush persisted the payload stamped `timestamp`.
    SyncCompleted { timestamp: i64 },
    /// A flush gave up after exhausting its retries.
    SyncFailed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateReason {
    StoreChanged,
    /// The coordinator (re)started and has no handshake state; foreground
    /// instances must announce themselves again.
    CoordinatorStarted,
}

impl SyncMessage {
    /// Topic the message travels on, derived from its direction.
    pub fn topic(&self) -> &'static str {
        match self {
            SyncMessage::SyncInited { .. } | SyncMessage::SyncRequest { .. } => TOPIC_SYNC_REQUEST,
            SyncMessage::SyncUpdate { .. }
            | SyncMessage::SyncCompleted { .. }
            | SyncMessage::SyncFailed { .. } => TOPIC_SYNC_STATUS,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::SyncInited { .. } => "SYNC_INITED",
            SyncMessage::SyncRequest { .. } => "SYNC_REQUEST",
            SyncMessage::SyncUpdate { .. } => "SYNC_UPDATE",
            SyncMessage::SyncCompleted { .. } => "SYNC_COMPLETED",
            SyncMessage::SyncFailed { .. } => "SYNC_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn encodes_adjacently_tagged() {
        let msg = SyncMessage::SyncInited {
            instance_id: "tab-1".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "SYNC_INITED");
        assert_eq!(value["payload"]["instanceId"], "tab-1");
        assert_eq!(msg.kind(), "SYNC_INITED");
    }

    #[test]
    fn request_carries_full_snapshot() {
        let msg = SyncMessage::SyncRequest {
            data: ReplicatedPayload::new(Settings::default(), vec![], 10),
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: SyncMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["payload"]["data"]["lastUpdate"], 10);
    }

    #[test]
    fn update_reason_is_camel_case() {
        let value = serde_json::to_value(SyncMessage::SyncUpdate {
            reason: UpdateReason::CoordinatorStarted,
        })
        .unwrap();
        assert_eq!(value["payload"]["reason"], "coordinatorStarted");
    }

    #[test]
    fn topics_follow_direction() {
        assert_eq!(
            SyncMessage::SyncFailed { error: "x".into() }.topic(),
            TOPIC_SYNC_STATUS
        );
        assert_eq!(
            SyncMessage::SyncInited {
                instance_id: "a".into()
            }
            .topic(),
            TOPIC_SYNC_REQUEST
        );
    }

    #[test]
    fn rejects_unknown_message_type() {
        let err = serde_json::from_str::<SyncMessage>(r#"{"type":"SYNC_NOPE","payload":{}}"#);
        assert!(err.is_err());
    }
}
