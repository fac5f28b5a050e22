/// Request-side and status-side halves of the coordinator's bus wiring.
pub mod subscriber {
    pub use crate::bus_ingest::{INGEST_TOPICS, ingest_message, start_bus_ingest};
}

pub mod publisher {
    pub use crate::bus_publisher::{PUBLISH_TOPICS, StatusPublisher};
}
