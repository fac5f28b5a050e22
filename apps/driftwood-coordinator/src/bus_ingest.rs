use std::sync::Arc;

use driftwood_proto::{SyncMessage, TOPIC_SYNC_REQUEST};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use transport_bus::Bus;

/// Topics the coordinator listens on.
pub const INGEST_TOPICS: &[&str] = &[TOPIC_SYNC_REQUEST];

/// Decodes one request-direction message. Anything else on the topic is
/// logged and dropped.
pub fn ingest_message(topic: &str, payload: &[u8]) -> Option<SyncMessage> {
    let message = match serde_json::from_slice::<SyncMessage>(payload) {
        Ok(message) => message,
        Err(err) => {
            warn!(topic, error = %err, "failed to parse sync message");
            return None;
        }
    };
    match message {
        SyncMessage::SyncInited { .. } | SyncMessage::SyncRequest { .. } => Some(message),
        other => {
            debug!(topic, kind = other.kind(), "ignoring message not meant for the coordinator");
            None
        }
    }
}

/// Subscribes to the request topic and forwards decoded messages to the
/// coordinator task.
pub fn start_bus_ingest(bus: Arc<dyn Bus>, sink: mpsc::Sender<SyncMessage>) -> Vec<JoinHandle<()>> {
    INGEST_TOPICS
        .iter()
        .map(|topic| {
            let mut sub = bus.subscribe(topic);
            let sink = sink.clone();
            tokio::spawn(async move {
                loop {
                    match sub.recv().await {
                        Ok(msg) => {
                            let Some(message) = ingest_message(topic, &msg.payload) else {
                                continue;
                            };
                            if sink.send(message).await.is_err() {
                                debug!(topic, "coordinator gone; stopping ingest");
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(topic, skipped, "bus ingest lagged; messages dropped");
                        }
                        Err(RecvError::Closed) => {
                            warn!(topic, "bus ingest channel closed");
                            break;
                        }
                    }
                }
            })
        })
        .collect()
}
