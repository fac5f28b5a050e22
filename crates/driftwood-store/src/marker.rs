use std::sync::Arc;

use driftwood_proto::{LocalSyncMarker, SyncFeatureFlag, LOCAL_FEATURE_KEY, LOCAL_MARKER_KEY};
use tokio::sync::Mutex;
use tracing::debug;

use crate::kv::KeyValueStore;
use crate::StoreError;

/// Reconciliation watermark of one device.
///
/// Clones share one lock, so every context on the device that advances the
/// marker through the same `MarkerStore` is serialised and the stored value
/// never moves backwards.
#[derive(Clone)]
pub struct MarkerStore {
    store: Arc<dyn KeyValueStore>,
    lock: Arc<Mutex<()>>,
}

impl MarkerStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load(&self) -> Result<LocalSyncMarker, StoreError> {
        match self.store.get(LOCAL_MARKER_KEY).await? {
            Some(raw) => Ok(serde_json::from_value(raw)?),
            None => Ok(LocalSyncMarker::default()),
        }
    }

    /// Moves the watermark to `last_update` if that is newer. Returns whether a
    /// write happened.
    pub async fn advance(&self, last_update: i64) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let current = self.load().await?;
        if last_update <= current.last_update {
            debug!(
                current = current.last_update,
                requested = last_update,
                "sync marker already at or past requested watermark"
            );
            return Ok(false);
        }
        let marker = LocalSyncMarker { last_update };
        self.store
            .set(LOCAL_MARKER_KEY, serde_json::to_value(marker)?)
            .await?;
        Ok(true)
    }
}

/// Persistent per-device sync on/off switch.
#[derive(Clone)]
pub struct FeatureFlagStore {
    store: Arc<dyn KeyValueStore>,
}

impl FeatureFlagStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<SyncFeatureFlag, StoreError> {
        match self.store.get(LOCAL_FEATURE_KEY).await? {
            Some(raw) => Ok(serde_json::from_value(raw)?),
            None => Ok(SyncFeatureFlag::default()),
        }
    }

    /// Turns sync off because the replicated data was written by schema `version`.
    pub async fn disable(&self, version: u32) -> Result<(), StoreError> {
        let flag = SyncFeatureFlag {
            enabled: false,
            disabled_at_version: Some(version),
        };
        self.store
            .set(LOCAL_FEATURE_KEY, serde_json::to_value(flag)?)
            .await
    }

    pub async fn enable(&self) -> Result<(), StoreError> {
        self.store
            .set(
                LOCAL_FEATURE_KEY,
                serde_json::to_value(SyncFeatureFlag::default())?,
            )
            .await
    }
}
