use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::StoreError;

/// Notification that the record under `key` was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
}

/// Platform key-value store. Reads and writes are whole-record.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Change feed covering writes from every context sharing the store,
    /// including other devices when the store is replicated.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// In-memory adapter for tests and single-process wiring.
pub struct InMemoryKeyValueStore {
    records: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
    item_quota: Option<usize>,
    failing_writes: AtomicU32,
    writes: AtomicU64,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            changes: broadcast::channel(64).0,
            item_quota: None,
            failing_writes: AtomicU32::new(0),
            writes: AtomicU64::new(0),
        }
    }
}

impl InMemoryKeyValueStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rejects any single record whose JSON encoding exceeds `bytes`, the way
    /// replicated platform stores enforce a per-item quota.
    pub fn with_item_quota(bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            item_quota: Some(bytes),
            ..Self::default()
        })
    }

    /// Makes the next `count` writes fail with a backend error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.records.lock().await.clone()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn notify(&self, key: &str) {
        // Nobody listening is fine.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
        });
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.take_injected_failure() {
            return Err(StoreError::Backend(format!("injected write failure for {key}")));
        }
        if let Some(quota) = self.item_quota {
            let size = serde_json::to_vec(&value)?.len();
            if size > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    size,
                    quota,
                });
            }
        }
        self.records.lock().await.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.notify(key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.records.lock().await.remove(key);
        if removed.is_some() {
            self.notify(key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
