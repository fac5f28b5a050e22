use std::sync::{Arc, Weak};

use driftwood_proto::{
    BookmarkList, CURRENT_VERSION, LocalRecord, ReplicatedPayload, Settings, SyncMessage,
    TOPIC_SYNC_REQUEST, TOPIC_SYNC_STATUS, UpdateReason,
};
use driftwood_store::{Clock, DeviceStores, LoadStatus, StoreError};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use transport_bus::{decode_json, Bus, BusExt};

use crate::config::ClientConfig;
use crate::debounce::Debouncer;
use crate::events::{EventHub, EventSubscription, SyncEvent, SyncStatus};
use crate::guard::PullGuard;
use crate::SyncClientError;

/// Collaborators a foreground instance runs against.
#[derive(Clone)]
pub struct SyncDeps {
    pub bus: Arc<dyn Bus>,
    pub stores: DeviceStores,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Reconciled,
    Pushing,
    Pulling,
    Detached,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    InSync,
    Pushed,
    Pulled,
    VersionSkew,
    Disabled,
    /// Not initialized, detached, or a pull is already being applied.
    Skipped,
    /// An error was reported through [`SyncEvent::SyncError`].
    Errored,
}

struct LocalState {
    record: LocalRecord,
    /// Logical time of the local snapshot. Seeded from the later of the
    /// record's own stamp and the sync marker.
    last_update: i64,
    enabled: bool,
}

struct Inner {
    config: ClientConfig,
    bus: Arc<dyn Bus>,
    stores: DeviceStores,
    clock: Arc<dyn Clock>,
    local: tokio::sync::Mutex<LocalState>,
    phase: Mutex<SyncPhase>,
    pull_guard: PullGuard,
    debouncer: Debouncer,
    events: EventHub,
    status: watch::Sender<SyncStatus>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Foreground sync store. Cheap to clone; every clone drives the same instance.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl SyncClient {
    /// Creates the instance and starts listening for coordinator broadcasts.
    /// Call [`initialize`](Self::initialize) before mutating.
    pub fn start(deps: SyncDeps, config: ClientConfig) -> Self {
        let status_feed = deps.bus.subscribe(TOPIC_SYNC_STATUS);
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let debounced = weak.clone();
            let debouncer = Debouncer::spawn(config.debounce, move || {
                let weak = debounced.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        SyncClient { inner }.check_cloud_sync().await;
                    }
                }
            });
            Inner {
                config,
                bus: deps.bus,
                stores: deps.stores,
                clock: deps.clock,
                local: tokio::sync::Mutex::new(LocalState {
                    record: LocalRecord::default(),
                    last_update: 0,
                    enabled: true,
                }),
                phase: Mutex::new(SyncPhase::Uninitialized),
                pull_guard: PullGuard::new(),
                debouncer,
                events: EventHub::default(),
                status: watch::channel(SyncStatus::Idle).0,
                listener: Mutex::new(None),
            }
        });
        let listener = spawn_listener(Arc::downgrade(&inner), status_feed);
        *inner.listener.lock() = Some(listener);
        SyncClient { inner }
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.config.instance_id
    }

    pub fn phase(&self) -> SyncPhase {
        *self.inner.phase.lock()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_events<F>(&self, callback: F) -> EventSubscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(Arc::new(callback))
    }

    pub fn unsubscribe_events(&self, subscription: EventSubscription) -> bool {
        self.inner.events.unsubscribe(subscription)
    }

    pub async fn snapshot(&self) -> LocalRecord {
        self.inner.local.lock().await.record.clone()
    }

    pub async fn last_update(&self) -> i64 {
        self.inner.local.lock().await.last_update
    }

    /// Loads the local record, watermark and feature flag, announces this
    /// instance to the coordinator and reconciles once.
    pub async fn initialize(&self) -> SyncDecision {
        if self.phase() != SyncPhase::Uninitialized {
            return SyncDecision::Skipped;
        }
        if let Err(err) = self.load_local().await {
            return self.report(err);
        }
        self.set_phase(SyncPhase::Reconciled);
        self.announce();
        self.check_cloud_sync().await
    }

    /// Compares local and replicated state and pushes, pulls or does nothing.
    /// Failures are reported as events, never returned.
    pub async fn check_cloud_sync(&self) -> SyncDecision {
        match self.reconcile().await {
            Ok(decision) => decision,
            Err(err) => self.report(err),
        }
    }

    /// Applies `edit` to the local settings. Returns whether the edit was committed.
    pub async fn update_settings<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut Settings),
    {
        self.mutate(|record| edit(&mut record.settings)).await
    }

    /// Applies `edit` to the local bookmark list. Returns whether the edit was committed.
    pub async fn update_bookmarks<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut BookmarkList),
    {
        self.mutate(|record| edit(&mut record.bookmarks)).await
    }

    /// Turns sync back on after a version skew and reconciles.
    pub async fn enable_sync(&self) -> SyncDecision {
        let result = async {
            self.inner.stores.feature.enable().await?;
            self.inner.local.lock().await.enabled = true;
            Ok::<_, SyncClientError>(())
        }
        .await;
        if let Err(err) = result {
            return self.report(err);
        }
        self.inner.status.send_replace(SyncStatus::Idle);
        self.check_cloud_sync().await
    }

    /// Stops listening and drops any pending debounced check.
    pub fn detach(&self) {
        self.set_phase(SyncPhase::Detached);
        self.inner.debouncer.stop();
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
        debug!(instance = %self.inner.config.instance_id, "sync client detached");
    }

    async fn load_local(&self) -> Result<(), SyncClientError> {
        let stores = &self.inner.stores;
        let loaded = stores.settings.load_and_upgrade().await?;
        let record = match loaded {
            Some(loaded) => {
                if let LoadStatus::Reset { reason } = &loaded.status {
                    self.inner.events.emit(&SyncEvent::SyncError {
                        message: format!("local settings were reset to defaults: {reason}"),
                    });
                }
                loaded.value
            }
            None => LocalRecord::default(),
        };
        let marker = stores.marker.load().await?;
        let flag = stores.feature.load().await?;

        let mut local = self.inner.local.lock().await;
        local.last_update = record.last_update.max(marker.last_update);
        local.record = record;
        local.enabled = flag.enabled;
        if !flag.enabled {
            self.inner.status.send_replace(SyncStatus::Disabled);
        }
        debug!(
            instance = %self.inner.config.instance_id,
            last_update = local.last_update,
            enabled = local.enabled,
            "loaded local sync state"
        );
        Ok(())
    }

    async fn reconcile(&self) -> Result<SyncDecision, SyncClientError> {
        if matches!(
            self.phase(),
            SyncPhase::Uninitialized | SyncPhase::Detached
        ) {
            return Ok(SyncDecision::Skipped);
        }
        if self.inner.pull_guard.is_held() {
            return Ok(SyncDecision::Skipped);
        }
        let mut local = self.inner.local.lock().await;
        if !local.enabled {
            return Ok(SyncDecision::Disabled);
        }

        let loaded = match self.inner.stores.payload.load().await {
            Ok(loaded) => loaded,
            Err(StoreError::VersionAhead { stored, .. }) => {
                return self.refuse_newer_schema(&mut local, stored).await;
            }
            Err(err) => return Err(err.into()),
        };
        let remote = match loaded {
            Some(loaded) if matches!(loaded.status, LoadStatus::Reset { .. }) => {
                warn!("replicated payload unreadable; local state is authoritative");
                return self.push(&mut local);
            }
            Some(loaded) if loaded.stored_version < CURRENT_VERSION => {
                debug!(
                    remote_version = loaded.stored_version,
                    "replicated payload on an older schema; pushing"
                );
                return self.push(&mut local);
            }
            Some(loaded) if !loaded.value.is_factory_default() => loaded.value,
            _ => {
                // Nobody has synced yet: this device's snapshot becomes authoritative.
                if local.last_update == 0 {
                    local.last_update = self.inner.clock.now_ms();
                }
                return self.push(&mut local);
            }
        };

        if remote.last_update == local.last_update {
            trace!(last_update = local.last_update, "already reconciled");
            return Ok(SyncDecision::InSync);
        }
        if remote.last_update < local.last_update {
            return self.push(&mut local);
        }
        self.pull(&mut local, remote).await
    }

    fn push(&self, local: &mut LocalState) -> Result<SyncDecision, SyncClientError> {
        let data = ReplicatedPayload::new(
            local.record.settings.clone(),
            local.record.bookmarks.clone(),
            local.last_update,
        );
        self.set_phase(SyncPhase::Pushing);
        self.inner.status.send_replace(SyncStatus::Syncing);
        self.inner
            .bus
            .publish_json(TOPIC_SYNC_REQUEST, &SyncMessage::SyncRequest { data })?;
        debug!(
            instance = %self.inner.config.instance_id,
            last_update = local.last_update,
            "requested replicated write"
        );
        Ok(SyncDecision::Pushed)
    }

    async fn pull(
        &self,
        local: &mut LocalState,
        remote: ReplicatedPayload,
    ) -> Result<SyncDecision, SyncClientError> {
        let Some(_token) = self.inner.pull_guard.try_acquire() else {
            return Ok(SyncDecision::Skipped);
        };
        self.set_phase(SyncPhase::Pulling);
        let record = LocalRecord {
            version: CURRENT_VERSION,
            settings: remote.settings.with_device_fields(&local.record.settings),
            bookmarks: remote.bookmarks,
            last_update: remote.last_update,
        };
        let committed = self.commit(local, record).await;
        self.set_phase(SyncPhase::Reconciled);
        committed?;
        self.inner.stores.marker.advance(remote.last_update).await?;
        self.inner.status.send_replace(SyncStatus::Synced {
            at: remote.last_update,
        });
        info!(
            instance = %self.inner.config.instance_id,
            last_update = remote.last_update,
            "pulled replicated settings"
        );
        Ok(SyncDecision::Pulled)
    }

    async fn refuse_newer_schema(
        &self,
        local: &mut LocalState,
        remote: u32,
    ) -> Result<SyncDecision, SyncClientError> {
        local.enabled = false;
        self.inner.status.send_replace(SyncStatus::Disabled);
        warn!(
            remote_version = remote,
            local_version = CURRENT_VERSION,
            "replicated settings are newer than this build; disabling sync"
        );
        let persisted = self.inner.stores.feature.disable(remote).await;
        self.report(SyncClientError::VersionSkew {
            remote,
            local: CURRENT_VERSION,
        });
        persisted?;
        Ok(SyncDecision::VersionSkew)
    }

    async fn mutate<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut LocalRecord),
    {
        if matches!(
            self.phase(),
            SyncPhase::Uninitialized | SyncPhase::Detached
        ) {
            warn!(instance = %self.inner.config.instance_id, "mutation outside an active session ignored");
            return false;
        }
        let mut local = self.inner.local.lock().await;
        let mut record = local.record.clone();
        edit(&mut record);
        if record == local.record {
            return true;
        }
        match self.commit(&mut local, record).await {
            Ok(()) => true,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    /// Persists the local record. Outside a pull the record is a user edit:
    /// it is stamped before the write and the debounced push is triggered.
    async fn commit(
        &self,
        local: &mut LocalState,
        mut record: LocalRecord,
    ) -> Result<(), SyncClientError> {
        let edit = !self.inner.pull_guard.is_held();
        if edit {
            record.last_update = self.inner.clock.now_ms().max(local.last_update + 1);
        }
        self.inner.stores.settings.save(&record).await?;
        local.last_update = record.last_update;
        local.record = record;
        if edit {
            self.inner.debouncer.trigger();
        } else {
            trace!("local write from pull; not a user edit");
        }
        Ok(())
    }

    fn announce(&self) {
        let message = SyncMessage::SyncInited {
            instance_id: self.inner.config.instance_id.clone(),
        };
        if let Err(err) = self.inner.bus.publish_json(TOPIC_SYNC_REQUEST, &message) {
            warn!(error = %err, "failed to announce instance to coordinator");
        }
    }

    async fn on_status(&self, message: SyncMessage) {
        match message {
            SyncMessage::SyncUpdate { reason } => {
                if reason == UpdateReason::CoordinatorStarted {
                    self.announce();
                }
                self.check_cloud_sync().await;
            }
            SyncMessage::SyncCompleted { timestamp } => {
                self.settle(SyncStatus::Synced { at: timestamp });
                self.check_cloud_sync().await;
            }
            SyncMessage::SyncFailed { error } => {
                self.settle(SyncStatus::Failed {
                    error: error.clone(),
                });
                self.inner
                    .events
                    .emit(&SyncEvent::SyncError { message: error });
            }
            other => trace!(kind = other.kind(), "ignoring request-direction message"),
        }
    }

    /// Records a flush outcome and leaves the pushing phase.
    fn settle(&self, status: SyncStatus) {
        {
            let mut phase = self.inner.phase.lock();
            if *phase == SyncPhase::Pushing {
                *phase = SyncPhase::Reconciled;
            }
        }
        if *self.inner.status.borrow() != SyncStatus::Disabled {
            self.inner.status.send_replace(status);
        }
    }

    fn set_phase(&self, next: SyncPhase) {
        let mut phase = self.inner.phase.lock();
        if *phase != SyncPhase::Detached {
            *phase = next;
        }
    }

    fn report(&self, err: SyncClientError) -> SyncDecision {
        match err {
            SyncClientError::VersionSkew { remote, local } => {
                self.inner
                    .events
                    .emit(&SyncEvent::VersionMismatch { remote, local });
                SyncDecision::VersionSkew
            }
            other => {
                warn!(instance = %self.inner.config.instance_id, error = %other, "sync failed");
                self.inner.status.send_replace(SyncStatus::Failed {
                    error: other.to_string(),
                });
                self.inner.events.emit(&SyncEvent::SyncError {
                    message: other.to_string(),
                });
                SyncDecision::Errored
            }
        }
    }
}

fn spawn_listener(
    weak: Weak<Inner>,
    mut feed: tokio::sync::broadcast::Receiver<transport_bus::BusMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = match feed.recv().await {
                Ok(msg) => msg,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "status feed lagged; reconciling");
                    let Some(inner) = weak.upgrade() else { break };
                    SyncClient { inner }.check_cloud_sync().await;
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let message = match decode_json::<SyncMessage>(&msg) {
                Ok(envelope) => envelope.message,
                Err(err) => {
                    warn!(error = %err, "failed to decode status message");
                    continue;
                }
            };
            let Some(inner) = weak.upgrade() else { break };
            SyncClient { inner }.on_status(message).await;
        }
    })
}
