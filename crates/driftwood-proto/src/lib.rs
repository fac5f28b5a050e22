//! Shared data model and wire protocol for driftwood settings sync.
//! Kept free of I/O and runtime dependencies so the coordinator, foreground
//! clients and any future bindings agree on one definition of every shape.

pub mod message;
pub mod migrate;
pub mod payload;
pub mod settings;

pub use message::{
    SyncMessage, UpdateReason, SYNC_TOPICS, TOPIC_SYNC_REQUEST, TOPIC_SYNC_STATUS,
};
pub use migrate::{migrate, migrate_from, stored_version, MigrationError, CURRENT_VERSION};
pub use payload::{
    LocalRecord, LocalSyncMarker, ReplicatedPayload, SyncFeatureFlag, LOCAL_FEATURE_KEY,
    LOCAL_MARKER_KEY, LOCAL_SETTINGS_KEY, REPLICATED_KEY,
};
pub use settings::{
    Background, BackgroundKind, Bookmark, BookmarkList, ClockSettings, Settings, Theme,
};
