//! Storage plumbing for driftwood: the platform key-value store abstraction,
//! typed accessors for each logical record, and the clock used to stamp
//! modifications.

use std::sync::Arc;

use driftwood_proto::{
    LocalRecord, MigrationError, ReplicatedPayload, LOCAL_SETTINGS_KEY, REPLICATED_KEY,
};
use thiserror::Error;

pub mod clock;
pub mod kv;
pub mod marker;
pub mod versioned;

pub use clock::{Clock, ManualClock, SystemClock};
pub use kv::{InMemoryKeyValueStore, KeyValueStore, StoreChange};
pub use marker::{FeatureFlagStore, MarkerStore};
pub use versioned::{LoadStatus, Loaded, VersionedStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("record {key} is {size} bytes, over the {quota} byte item quota")]
    QuotaExceeded {
        key: String,
        size: usize,
        quota: usize,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("record {key} failed migration: {source}")]
    Migration {
        key: String,
        #[source]
        source: MigrationError,
    },
    #[error("record {key} has schema v{stored}, newer than supported v{supported}")]
    VersionAhead {
        key: String,
        stored: u32,
        supported: u32,
    },
}

/// Every store accessor one device needs, built over its local store and the
/// replicated store. Clone it into each context on the device so they share
/// the marker lock.
#[derive(Clone)]
pub struct DeviceStores {
    pub local: Arc<dyn KeyValueStore>,
    pub replicated: Arc<dyn KeyValueStore>,
    pub settings: VersionedStore<LocalRecord>,
    pub payload: VersionedStore<ReplicatedPayload>,
    pub marker: MarkerStore,
    pub feature: FeatureFlagStore,
}

impl DeviceStores {
    pub fn new(local: Arc<dyn KeyValueStore>, replicated: Arc<dyn KeyValueStore>) -> Self {
        Self {
            settings: VersionedStore::new(Arc::clone(&local), LOCAL_SETTINGS_KEY),
            payload: VersionedStore::new(Arc::clone(&replicated), REPLICATED_KEY),
            marker: MarkerStore::new(Arc::clone(&local)),
            feature: FeatureFlagStore::new(Arc::clone(&local)),
            local,
            replicated,
        }
    }
}
