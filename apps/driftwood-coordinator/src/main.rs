use std::sync::Arc;

use driftwood_coordinator::config::CoordinatorConfig;
use driftwood_coordinator::metrics;
use driftwood_coordinator::telemetry::init_tracing;
use driftwood_coordinator::{Coordinator, CoordinatorDeps, IntervalWakeSource};
use driftwood_store::{DeviceStores, InMemoryKeyValueStore};
use tracing::{debug, info};
use transport_bus::LocalBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = CoordinatorConfig::from_env();
    init_tracing(&cfg.log_filter);

    let stores = DeviceStores::new(
        InMemoryKeyValueStore::new(),
        InMemoryKeyValueStore::with_item_quota(cfg.item_quota_bytes),
    );
    let deps = CoordinatorDeps {
        bus: Arc::new(LocalBus::new()),
        stores,
        wake: Arc::new(IntervalWakeSource::new()),
    };

    info!(
        flush_interval_ms = cfg.flush_interval.as_millis() as u64,
        wake_period_secs = cfg.wake_period.as_secs(),
        max_write_retries = cfg.max_write_retries,
        retry_delay_ms = cfg.retry_delay.as_millis() as u64,
        item_quota_bytes = cfg.item_quota_bytes,
        "starting driftwood-coordinator"
    );
    metrics::BOOT_COUNTER.inc();
    let handle = Coordinator::spawn(deps, cfg).await?;

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await?;
    debug!(metrics = %metrics::render(), "final metrics");
    Ok(())
}
