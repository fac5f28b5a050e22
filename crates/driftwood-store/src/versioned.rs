use std::marker::PhantomData;
use std::sync::Arc;

use driftwood_proto::{migrate, stored_version, MigrationError, CURRENT_VERSION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::kv::KeyValueStore;
use crate::StoreError;

/// How a record was obtained from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Current,
    Migrated { from: u32 },
    /// The stored shape could not be migrated; factory defaults were
    /// substituted and the user should be told a reset happened.
    Reset { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub stored_version: u32,
    pub status: LoadStatus,
}

impl<T> Loaded<T> {
    pub fn needs_write_back(&self) -> bool {
        !matches!(self.status, LoadStatus::Current)
    }
}

/// Typed accessor for one versioned record that migrates stale shapes on read.
pub struct VersionedStore<T> {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for VersionedStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key,
            _record: PhantomData,
        }
    }
}

impl<T> VersionedStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            _record: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Raw version tag of the stored record without migrating it.
    pub async fn peek_version(&self) -> Result<Option<u32>, StoreError> {
        match self.store.get(self.key).await? {
            Some(raw) => Ok(Some(stored_version(&raw).map_err(|source| {
                StoreError::Migration {
                    key: self.key.to_string(),
                    source,
                }
            })?)),
            None => Ok(None),
        }
    }

    /// Reads and migrates the record. Never writes.
    ///
    /// A record written by newer code is reported as [`StoreError::VersionAhead`];
    /// any other migration failure falls back to `T::default()` with
    /// [`LoadStatus::Reset`] rather than exposing a half-migrated value.
    pub async fn load(&self) -> Result<Option<Loaded<T>>, StoreError> {
        let Some(raw) = self.store.get(self.key).await? else {
            return Ok(None);
        };
        let stored = match stored_version(&raw) {
            Ok(version) => version,
            Err(err) => return Ok(Some(self.reset(0, err.to_string()))),
        };
        if stored > CURRENT_VERSION {
            return Err(StoreError::VersionAhead {
                key: self.key.to_string(),
                stored,
                supported: CURRENT_VERSION,
            });
        }
        let migrated = match migrate(raw) {
            Ok(value) => value,
            Err(MigrationError::FromTheFuture { stored, supported }) => {
                return Err(StoreError::VersionAhead {
                    key: self.key.to_string(),
                    stored,
                    supported,
                })
            }
            Err(err) => return Ok(Some(self.reset(stored, err.to_string()))),
        };
        let value = match serde_json::from_value::<T>(migrated) {
            Ok(value) => value,
            Err(err) => return Ok(Some(self.reset(stored, err.to_string()))),
        };
        let status = if stored == CURRENT_VERSION {
            LoadStatus::Current
        } else {
            debug!(key = self.key, from = stored, to = CURRENT_VERSION, "migrated record");
            LoadStatus::Migrated { from: stored }
        };
        Ok(Some(Loaded {
            value,
            stored_version: stored,
            status,
        }))
    }

    /// Like [`load`](Self::load), but persists migrated or reset records so the
    /// upgrade happens once. Only for records this context owns.
    pub async fn load_and_upgrade(&self) -> Result<Option<Loaded<T>>, StoreError> {
        let loaded = self.load().await?;
        if let Some(loaded) = &loaded {
            if loaded.needs_write_back() {
                self.save(&loaded.value).await?;
            }
        }
        Ok(loaded)
    }

    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_value(value)?;
        self.store.set(self.key, raw).await
    }

    fn reset(&self, stored: u32, reason: String) -> Loaded<T> {
        warn!(
            key = self.key,
            stored_version = stored,
            reason = %reason,
            "record could not be migrated; falling back to defaults"
        );
        Loaded {
            value: T::default(),
            stored_version: stored,
            status: LoadStatus::Reset { reason },
        }
    }
}
