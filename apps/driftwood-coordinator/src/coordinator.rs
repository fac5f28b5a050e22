use std::future::pending;
use std::sync::Arc;

use driftwood_proto::{REPLICATED_KEY, ReplicatedPayload, SyncMessage, UpdateReason};
use driftwood_store::{DeviceStores, StoreChange};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use transport_bus::{Bus, BusResult};

use crate::CoordinatorError;
use crate::bus_ingest::start_bus_ingest;
use crate::bus_publisher::StatusPublisher;
use crate::config::CoordinatorConfig;
use crate::metrics;
use crate::pipeline::{self, FlushOutcome, Persisted};
use crate::state::CoordinatorState;
use crate::wake::{WAKE_NAME, WakeAction, WakeEvent, WakeScheduler, WakeSource};

const INGEST_BUFFER: usize = 64;

/// Collaborators the coordinator runs against.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub bus: Arc<dyn Bus>,
    pub stores: DeviceStores,
    pub wake: Arc<dyn WakeSource>,
}

/// Background coordinator: sole writer of the replicated payload.
pub struct Coordinator {
    config: CoordinatorConfig,
    stores: DeviceStores,
    publisher: StatusPublisher,
    state: CoordinatorState,
    flushes: JoinSet<FlushOutcome>,
}

impl Coordinator {
    /// Registers the durable wake, wires the bus and store feeds, announces the
    /// start to foreground instances and runs the coordinator task.
    pub async fn spawn(
        deps: CoordinatorDeps,
        config: CoordinatorConfig,
    ) -> Result<CoordinatorHandle, CoordinatorError> {
        let granted = deps.wake.register(WAKE_NAME, config.wake_period).await?;
        let wakes = deps.wake.subscribe();
        let changes = deps.stores.replicated.subscribe();
        let (ingest_tx, ingest_rx) = mpsc::channel(INGEST_BUFFER);
        let ingest = start_bus_ingest(Arc::clone(&deps.bus), ingest_tx);

        let coordinator = Coordinator {
            publisher: StatusPublisher::new(Arc::clone(&deps.bus)),
            stores: deps.stores,
            state: CoordinatorState::new(),
            flushes: JoinSet::new(),
            config,
        };
        info!(
            wake = WAKE_NAME,
            wake_period_secs = granted.as_secs(),
            flush_interval_ms = coordinator.config.flush_interval.as_millis() as u64,
            "sync coordinator starting"
        );
        coordinator.report(
            "SYNC_UPDATE",
            coordinator
                .publisher
                .publish_update(UpdateReason::CoordinatorStarted),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(coordinator.run(ingest_rx, wakes, changes, shutdown_rx));
        Ok(CoordinatorHandle {
            shutdown: Some(shutdown_tx),
            task,
            ingest,
        })
    }

    async fn run(
        mut self,
        mut ingest: mpsc::Receiver<SyncMessage>,
        wakes: broadcast::Receiver<WakeEvent>,
        changes: broadcast::Receiver<StoreChange>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut wakes = Some(wakes);
        let mut changes = Some(changes);
        loop {
            let deadline = self.state.follow_up_at;
            tokio::select! {
                _ = &mut shutdown => break,
                Some(message) = ingest.recv() => self.on_message(message),
                event = recv_open(&mut wakes) => self.on_wake(event),
                change = recv_open(&mut changes) => self.on_store_change(change),
                Some(joined) = self.flushes.join_next() => match joined {
                    Ok(outcome) => self.on_flush_done(outcome),
                    Err(err) => {
                        warn!(error = %err, "flush task failed");
                        self.state.end_flush();
                    }
                },
                _ = sleep_until(deadline) => {
                    self.state.follow_up_at = None;
                    self.try_flush();
                }
            }
        }
        info!(queued = self.state.queue.len(), "sync coordinator stopped");
    }

    fn on_message(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::SyncInited { instance_id } => {
                if self.state.mark_inited(&instance_id) {
                    debug!(
                        instance = %instance_id,
                        instances = self.state.known_instances(),
                        "foreground instance inited"
                    );
                }
            }
            SyncMessage::SyncRequest { data } => self.enqueue(data),
            other => debug!(kind = other.kind(), "ignoring status message"),
        }
    }

    fn enqueue(&mut self, data: ReplicatedPayload) {
        if !self.state.is_inited {
            metrics::QUEUE_ENQUEUED.with_label_values(&["not_inited"]).inc();
            warn!(
                last_update = data.last_update,
                "sync request before any SYNC_INITED; dropping"
            );
            return;
        }
        let last_update = data.last_update;
        self.state.queue.push(data);
        metrics::QUEUE_ENQUEUED.with_label_values(&["accepted"]).inc();
        if !self.state.is_running {
            let at = self
                .state
                .next_flush_at(Instant::now(), self.config.flush_interval);
            self.state.schedule_follow_up(at);
        }
        debug!(
            last_update,
            queued = self.state.queue.len(),
            "enqueued sync request"
        );
    }

    fn on_wake(&mut self, event: WakeEvent) {
        match WakeScheduler::decide(&event, &self.state) {
            WakeAction::Flush => {
                metrics::WAKES.with_label_values(&["flush"]).inc();
                self.try_flush();
            }
            WakeAction::Ignore(reason) => {
                metrics::WAKES.with_label_values(&[reason.as_str()]).inc();
                debug!(name = %event.name, reason = reason.as_str(), "wake ignored");
            }
        }
    }

    fn on_store_change(&mut self, change: StoreChange) {
        if change.key != REPLICATED_KEY {
            return;
        }
        self.report(
            "SYNC_UPDATE",
            self.publisher.publish_update(UpdateReason::StoreChanged),
        );
    }

    /// Starts a flush if one is allowed right now. A no-op while a flush is in
    /// flight, when the queue is empty, or inside the throttle window (in
    /// which case the follow-up moves to the window's end).
    fn try_flush(&mut self) {
        if self.state.is_running {
            return;
        }
        let now = Instant::now();
        let interval = self.config.flush_interval;
        if !self.state.window_open(now, interval) {
            if let Some(last) = self.state.last_flush {
                self.state.follow_up_at = Some(last + interval);
            }
            return;
        }
        let Some(selection) = self.state.queue.select() else {
            self.state.follow_up_at = None;
            return;
        };
        self.state.begin_flush(now);
        debug!(
            last_update = selection.winner.last_update,
            candidates = selection.discarded + 1,
            attempt = self.state.retry_count + 1,
            "flushing sync queue"
        );
        let stores = self.stores.clone();
        self.flushes.spawn(async move {
            let last_update = selection.winner.last_update;
            let result = pipeline::persist(&stores, selection.winner).await;
            FlushOutcome {
                through_seq: selection.through_seq,
                discarded: selection.discarded,
                last_update,
                result,
            }
        });
    }

    fn on_flush_done(&mut self, outcome: FlushOutcome) {
        self.state.end_flush();
        let retryable = outcome.retryable();
        match outcome.result {
            Ok(Persisted::Superseded { stored }) => {
                self.state.queue.drain_through(outcome.through_seq);
                self.state.retry_count = 0;
                metrics::FLUSHES.with_label_values(&["superseded"]).inc();
                info!(
                    stored,
                    last_update = outcome.last_update,
                    "sync flush superseded by a later replicated payload"
                );
                self.report(
                    "SYNC_UPDATE",
                    self.publisher.publish_update(UpdateReason::StoreChanged),
                );
            }
            Ok(Persisted::Written) => {
                self.state.queue.drain_through(outcome.through_seq);
                self.state.retry_count = 0;
                metrics::FLUSHES.with_label_values(&["success"]).inc();
                metrics::QUEUE_COALESCED.inc_by(outcome.discarded as u64);
                info!(last_update = outcome.last_update, "sync flush completed");
                self.report(
                    "SYNC_COMPLETED",
                    self.publisher.publish_completed(outcome.last_update),
                );
            }
            Err(err) if retryable && self.state.retry_count < self.config.max_write_retries => {
                self.state.retry_count += 1;
                metrics::FLUSHES.with_label_values(&["retry"]).inc();
                warn!(
                    error = %err,
                    retry = self.state.retry_count,
                    max_retries = self.config.max_write_retries,
                    "sync flush failed; retrying"
                );
                self.state.follow_up_at = Some(Instant::now() + self.config.retry_delay);
                return;
            }
            Err(err) => {
                let dropped = self.state.queue.drain_through(outcome.through_seq);
                self.state.retry_count = 0;
                metrics::FLUSHES.with_label_values(&["failed"]).inc();
                warn!(error = %err, dropped, "sync flush gave up");
                self.report("SYNC_FAILED", self.publisher.publish_failed(err.to_string()));
            }
        }
        if !self.state.queue.is_empty() {
            let at = Instant::now() + self.config.flush_interval;
            self.state.schedule_follow_up(at);
        }
    }

    fn report(&self, kind: &'static str, result: BusResult<usize>) {
        match result {
            Ok(receivers) => debug!(kind, receivers, "broadcast sync status"),
            Err(err) => warn!(kind, error = %err, "failed to broadcast sync status"),
        }
    }
}

/// Owner's handle on a running coordinator. Dropping it stops the coordinator.
pub struct CoordinatorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    ingest: Vec<JoinHandle<()>>,
}

impl CoordinatorHandle {
    /// Stops after the current step. Anything still queued is discarded, as it
    /// would be when the platform suspends the process.
    pub async fn shutdown(mut self) -> Result<(), CoordinatorError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        for ingest in &self.ingest {
            ingest.abort();
        }
        self.task.await?;
        Ok(())
    }

    /// Kills the coordinator immediately, including any flush in flight.
    pub fn abort(self) {
        self.task.abort();
        for ingest in &self.ingest {
            ingest.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Receives from a broadcast feed, skipping lag and parking forever once the
/// feed closes.
async fn recv_open<T: Clone>(feed: &mut Option<broadcast::Receiver<T>>) -> T {
    loop {
        let Some(rx) = feed.as_mut() else {
            return pending().await;
        };
        match rx.recv().await {
            Ok(item) => return item,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "coordinator feed lagged");
            }
            Err(RecvError::Closed) => {
                *feed = None;
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}
