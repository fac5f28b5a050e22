use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::CoordinatorError;
use crate::state::CoordinatorState;

/// Name under which the coordinator registers its durable wake.
pub const WAKE_NAME: &str = "driftwood-sync-flush";

/// Shortest period platforms grant to a durable periodic wake.
pub const MIN_WAKE_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub name: String,
}

/// Durable periodic wake primitive. Registrations outlive process suspension
/// on real platforms; events carry the registered name.
#[async_trait]
pub trait WakeSource: Send + Sync {
    /// Registers or replaces the wake `name`. Returns the period actually granted.
    async fn register(&self, name: &str, period: Duration) -> Result<Duration, CoordinatorError>;

    fn subscribe(&self) -> broadcast::Receiver<WakeEvent>;
}

/// Interval-backed wake source for a single process.
pub struct IntervalWakeSource {
    events: broadcast::Sender<WakeEvent>,
    alarms: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Default for IntervalWakeSource {
    fn default() -> Self {
        Self {
            events: broadcast::channel(16).0,
            alarms: Mutex::new(HashMap::new()),
        }
    }
}

impl IntervalWakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires `name` immediately, as the platform would after a resume.
    pub fn trigger(&self, name: &str) -> usize {
        self.events
            .send(WakeEvent {
                name: name.to_string(),
            })
            .unwrap_or(0)
    }

    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.alarms.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl WakeSource for IntervalWakeSource {
    async fn register(&self, name: &str, period: Duration) -> Result<Duration, CoordinatorError> {
        let period = period.max(MIN_WAKE_PERIOD);
        let events = self.events.clone();
        let event = WakeEvent {
            name: name.to_string(),
        };
        let alarm = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = events.send(event.clone());
            }
        });
        if let Some(previous) = self.alarms.lock().insert(name.to_string(), alarm) {
            previous.abort();
        }
        debug!(name, period_secs = period.as_secs(), "registered periodic wake");
        Ok(period)
    }

    fn subscribe(&self) -> broadcast::Receiver<WakeEvent> {
        self.events.subscribe()
    }
}

impl Drop for IntervalWakeSource {
    fn drop(&mut self) {
        for (_, alarm) in self.alarms.lock().drain() {
            alarm.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    ForeignAlarm,
    NotInited,
    FlushRunning,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::ForeignAlarm => "foreign",
            IgnoreReason::NotInited => "not_inited",
            IgnoreReason::FlushRunning => "running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeAction {
    Ignore(IgnoreReason),
    Flush,
}

pub struct WakeScheduler;

impl WakeScheduler {
    pub fn decide(event: &WakeEvent, state: &CoordinatorState) -> WakeAction {
        if event.name != WAKE_NAME {
            return WakeAction::Ignore(IgnoreReason::ForeignAlarm);
        }
        if !state.is_inited {
            return WakeAction::Ignore(IgnoreReason::NotInited);
        }
        if state.is_running {
            return WakeAction::Ignore(IgnoreReason::FlushRunning);
        }
        WakeAction::Flush
    }
}
