use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Trailing debounce: `action` runs once `delay` has passed without a new
/// trigger. Each trigger restarts the wait.
pub struct Debouncer {
    signals: mpsc::UnboundedSender<()>,
    worker: JoinHandle<()>,
}

impl Debouncer {
    pub fn spawn<F, Fut>(delay: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (signals, mut rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(async move {
            'idle: while rx.recv().await.is_some() {
                loop {
                    tokio::select! {
                        signal = rx.recv() => match signal {
                            Some(()) => continue,
                            None => break 'idle,
                        },
                        _ = tokio::time::sleep(delay) => break,
                    }
                }
                action().await;
            }
        });
        Self { signals, worker }
    }

    pub fn trigger(&self) {
        let _ = self.signals.send(());
    }

    /// Stops the worker, dropping any pending run.
    pub fn stop(&self) {
        self.worker.abort();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(delay: Duration) -> (Debouncer, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let debouncer = Debouncer::spawn(delay, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (debouncer, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_triggers_collapse_into_one_run() {
        let (debouncer, runs) = counting(Duration::from_millis(2_000));
        for _ in 0..5 {
            debouncer.trigger();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(1_600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drops_the_pending_run() {
        let (debouncer, runs) = counting(Duration::from_millis(100));
        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.stop();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_run_separately() {
        let (debouncer, runs) = counting(Duration::from_millis(100));
        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(150)).await;
        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
