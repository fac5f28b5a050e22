use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// User-facing outcomes of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Replicated data was written by a newer schema; sync is off until the
    /// app is updated.
    VersionMismatch { remote: u32, local: u32 },
    SyncError { message: String },
}

impl SyncEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::VersionMismatch { .. } => "version-mismatch",
            SyncEvent::SyncError { .. } => "sync-error",
        }
    }
}

/// What a UI spinner shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Synced { at: i64 },
    Failed { error: String },
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventSubscription(u64);

type Callback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct EventHub {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(EventSubscription, Callback)>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self, callback: Callback) -> EventSubscription {
        let id = EventSubscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, callback));
        id
    }

    pub(crate) fn unsubscribe(&self, id: EventSubscription) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Runs every callback outside the lock, so a callback may subscribe or
    /// unsubscribe while handling the event.
    pub(crate) fn emit(&self, event: &SyncEvent) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_every_subscriber_until_unsubscribed() {
        let hub = EventHub::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let first = hub.subscribe(Arc::new(move |event: &SyncEvent| {
            sink.lock().push(event.event_type());
        }));
        let sink = Arc::clone(&seen);
        hub.subscribe(Arc::new(move |event: &SyncEvent| {
            sink.lock().push(event.event_type());
        }));

        hub.emit(&SyncEvent::SyncError {
            message: "quota".into(),
        });
        assert!(hub.unsubscribe(first));
        assert!(!hub.unsubscribe(first));
        hub.emit(&SyncEvent::VersionMismatch {
            remote: 5,
            local: 4,
        });

        assert_eq!(
            *seen.lock(),
            vec!["sync-error", "sync-error", "version-mismatch"]
        );
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let hub = Arc::new(EventHub::default());
        let own_id = Arc::new(Mutex::new(None::<EventSubscription>));
        let calls = Arc::new(AtomicU64::new(0));

        let weak_hub = Arc::downgrade(&hub);
        let id_slot = Arc::clone(&own_id);
        let counter = Arc::clone(&calls);
        let id = hub.subscribe(Arc::new(move |_event: &SyncEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(hub), Some(id)) = (weak_hub.upgrade(), *id_slot.lock()) {
                assert!(hub.unsubscribe(id));
                hub.subscribe(Arc::new(|_: &SyncEvent| {}));
            }
        }));
        *own_id.lock() = Some(id);

        let event = SyncEvent::SyncError {
            message: "reset".into(),
        };
        hub.emit(&event);
        hub.emit(&event);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
