use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::queue::SyncQueue;

/// Everything the coordinator keeps in memory. Owned by the coordinator task
/// alone; nothing here survives a restart.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    pub queue: SyncQueue,
    /// Start of the most recent flush attempt.
    pub last_flush: Option<Instant>,
    pub is_running: bool,
    pub is_inited: bool,
    pub retry_count: u32,
    /// The single pending in-memory flush deadline, if any.
    pub follow_up_at: Option<Instant>,
    instances: HashSet<String>,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a handshake. Returns true the first time `instance_id` is seen.
    pub fn mark_inited(&mut self, instance_id: &str) -> bool {
        self.is_inited = true;
        self.instances.insert(instance_id.to_string())
    }

    pub fn known_instances(&self) -> usize {
        self.instances.len()
    }

    /// Whether the throttle window since the last flush has elapsed.
    pub fn window_open(&self, now: Instant, interval: Duration) -> bool {
        match self.last_flush {
            Some(last) => now.saturating_duration_since(last) >= interval,
            None => true,
        }
    }

    /// Earliest moment a flush for something enqueued at `now` may run.
    pub fn next_flush_at(&self, now: Instant, interval: Duration) -> Instant {
        let trailing = now + interval;
        match self.last_flush {
            Some(last) => trailing.max(last + interval),
            None => trailing,
        }
    }

    /// Sets the follow-up deadline unless one is already pending.
    pub fn schedule_follow_up(&mut self, at: Instant) -> bool {
        if self.follow_up_at.is_some() {
            return false;
        }
        self.follow_up_at = Some(at);
        true
    }

    pub fn begin_flush(&mut self, now: Instant) {
        self.is_running = true;
        self.last_flush = Some(now);
        self.follow_up_at = None;
    }

    pub fn end_flush(&mut self) {
        self.is_running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(2_000);

    #[test]
    fn window_is_measured_from_flush_start() {
        let mut state = CoordinatorState::new();
        let t0 = Instant::now();
        assert!(state.window_open(t0, INTERVAL));
        state.begin_flush(t0);
        assert!(!state.window_open(t0 + Duration::from_millis(1_999), INTERVAL));
        assert!(state.window_open(t0 + INTERVAL, INTERVAL));
    }

    #[test]
    fn next_flush_respects_both_trailing_window_and_throttle() {
        let mut state = CoordinatorState::new();
        let t0 = Instant::now();
        assert_eq!(state.next_flush_at(t0, INTERVAL), t0 + INTERVAL);
        state.begin_flush(t0);
        let soon = t0 + Duration::from_millis(100);
        assert_eq!(state.next_flush_at(soon, INTERVAL), soon + INTERVAL);
    }

    #[test]
    fn only_one_follow_up_is_pending() {
        let mut state = CoordinatorState::new();
        let t0 = Instant::now();
        assert!(state.schedule_follow_up(t0 + INTERVAL));
        assert!(!state.schedule_follow_up(t0));
        assert_eq!(state.follow_up_at, Some(t0 + INTERVAL));
        state.begin_flush(t0 + INTERVAL);
        assert_eq!(state.follow_up_at, None);
    }

    #[test]
    fn handshake_counts_distinct_instances() {
        let mut state = CoordinatorState::new();
        assert!(!state.is_inited);
        assert!(state.mark_inited("tab-1"));
        assert!(!state.mark_inited("tab-1"));
        assert!(state.mark_inited("tab-2"));
        assert!(state.is_inited);
        assert_eq!(state.known_instances(), 2);
    }
}
