use driftwood_proto::ReplicatedPayload;
use driftwood_store::{DeviceStores, LoadStatus, StoreError};
use tracing::{debug, info, warn};

/// What a successful flush did to the replicated store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Written,
    /// The store already held a later `last_update`, so nothing was written.
    Superseded { stored: i64 },
}

/// Result of one flush attempt, reported back to the coordinator task.
#[derive(Debug)]
pub struct FlushOutcome {
    pub through_seq: u64,
    pub discarded: usize,
    pub last_update: i64,
    pub result: Result<Persisted, StoreError>,
}

impl FlushOutcome {
    /// Whether another attempt could succeed. A newer schema in the replicated
    /// store will not go away by retrying.
    pub fn retryable(&self) -> bool {
        !matches!(self.result, Err(StoreError::VersionAhead { .. }))
    }
}

/// Writes the redacted winner to the replicated store and moves this device's
/// watermark to its stamp. Never replaces a newer schema or a later
/// `last_update`.
pub async fn persist(
    stores: &DeviceStores,
    winner: ReplicatedPayload,
) -> Result<Persisted, StoreError> {
    if let Some(stored) = stored_newer_than(stores, winner.last_update).await? {
        info!(
            stored,
            last_update = winner.last_update,
            "replicated payload is newer than the queued winner; skipping write"
        );
        return Ok(Persisted::Superseded { stored });
    }
    let redacted = winner.redacted();
    stores.payload.save(&redacted).await?;
    // A marker failure does not fail the flush.
    match stores.marker.advance(redacted.last_update).await {
        Ok(advanced) => {
            debug!(last_update = redacted.last_update, advanced, "flushed sync payload")
        }
        Err(err) => warn!(
            last_update = redacted.last_update,
            error = %err,
            "flushed but failed to advance sync marker"
        ),
    }
    Ok(Persisted::Written)
}

/// The stored `last_update` when it is later than `last_update`. A newer schema
/// is [`StoreError::VersionAhead`]; an unreadable record may be replaced.
async fn stored_newer_than(
    stores: &DeviceStores,
    last_update: i64,
) -> Result<Option<i64>, StoreError> {
    match stores.payload.load().await? {
        Some(loaded) if matches!(loaded.status, LoadStatus::Reset { .. }) => {
            warn!(
                key = stores.payload.key(),
                "replacing unreadable replicated record"
            );
            Ok(None)
        }
        Some(loaded) if loaded.value.last_update > last_update => {
            Ok(Some(loaded.value.last_update))
        }
        _ => Ok(None),
    }
}
