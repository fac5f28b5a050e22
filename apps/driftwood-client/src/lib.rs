//! Foreground side of driftwood settings sync.
//!
//! A [`SyncClient`] owns one foreground instance's live settings and
//! bookmarks. It decides on every load and every local edit whether to push
//! local state through the coordinator, pull the replicated payload, or do
//! nothing, and it never writes the replicated store itself.

use thiserror::Error;

pub mod client;
pub mod config;
pub mod debounce;
pub mod events;
pub mod guard;

pub use client::{SyncClient, SyncDecision, SyncDeps, SyncPhase};
pub use config::ClientConfig;
pub use events::{EventSubscription, SyncEvent, SyncStatus};

#[derive(Debug, Error)]
pub enum SyncClientError {
    #[error("store error: {0}")]
    Store(#[from] driftwood_store::StoreError),
    #[error("bus error: {0}")]
    Bus(#[from] transport_bus::BusError),
    #[error("replicated settings use schema v{remote}; this build understands v{local}")]
    VersionSkew { remote: u32, local: u32 },
}
