use serde::{Deserialize, Serialize};

use crate::migrate::CURRENT_VERSION;
use crate::settings::{BookmarkList, Settings};

/// Key of the single record kept in the replicated store.
pub const REPLICATED_KEY: &str = "driftwood.sync";
/// Keys of the device-local (non-replicated) records.
pub const LOCAL_SETTINGS_KEY: &str = "settings";
pub const LOCAL_MARKER_KEY: &str = "syncMarker";
pub const LOCAL_FEATURE_KEY: &str = "syncFeature";

/// The only record written to the replicated store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedPayload {
    pub settings: Settings,
    pub bookmarks: BookmarkList,
    /// Logical modification time in epoch milliseconds.
    pub last_update: i64,
    pub version: u32,
}

impl Default for ReplicatedPayload {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            bookmarks: BookmarkList::new(),
            last_update: 0,
            version: CURRENT_VERSION,
        }
    }
}

impl ReplicatedPayload {
    pub fn new(settings: Settings, bookmarks: BookmarkList, last_update: i64) -> Self {
        Self {
            settings,
            bookmarks,
            last_update,
            version: CURRENT_VERSION,
        }
    }

    /// No device has ever synced into this record.
    pub fn is_factory_default(&self) -> bool {
        self.last_update == 0
    }

    pub fn redacted(&self) -> ReplicatedPayload {
        ReplicatedPayload {
            settings: self.settings.redacted(),
            bookmarks: self.bookmarks.clone(),
            last_update: self.last_update,
            version: self.version,
        }
    }
}

/// The device's own settings record in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub version: u32,
    pub settings: Settings,
    pub bookmarks: BookmarkList,
    /// Logical time of the last edit or pull applied to this record. Survives
    /// a reload so an edit that was never pushed is still ahead of the marker.
    #[serde(default)]
    pub last_update: i64,
}

impl Default for LocalRecord {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            settings: Settings::default(),
            bookmarks: BookmarkList::new(),
            last_update: 0,
        }
    }
}

/// The `lastUpdate` this device has already reconciled with the replicated store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalSyncMarker {
    pub last_update: i64,
}

/// Persistent per-device switch for synchronisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFeatureFlag {
    pub enabled: bool,
    /// Replicated schema version that forced sync off, if any.
    #[serde(default)]
    pub disabled_at_version: Option<u32>,
}

impl Default for SyncFeatureFlag {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled_at_version: None,
        }
    }
}
