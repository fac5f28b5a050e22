//! Background sync coordinator: the only writer of the replicated settings
//! payload. Foreground instances talk to it over the bus; it coalesces their
//! snapshots and flushes at most once per interval.

use thiserror::Error;

pub mod bus;
pub mod bus_ingest;
pub mod bus_publisher;
pub mod config;
pub mod coordinator;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod state;
pub mod telemetry;
pub mod wake;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorDeps, CoordinatorHandle};
pub use wake::{IntervalWakeSource, WAKE_NAME, WakeEvent, WakeSource};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("store error: {0}")]
    Store(#[from] driftwood_store::StoreError),
    #[error("bus error: {0}")]
    Bus(#[from] transport_bus::BusError),
    #[error("wake registration failed: {0}")]
    Wake(String),
    #[error("coordinator task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
