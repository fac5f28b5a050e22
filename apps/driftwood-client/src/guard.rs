use std::sync::atomic::{AtomicBool, Ordering};

/// Marks that a pull is writing local state, so the writes are not mistaken
/// for user edits.
#[derive(Debug, Default)]
pub struct PullGuard {
    held: AtomicBool,
}

/// Held for the duration of one pull. Releases the guard on drop.
#[derive(Debug)]
pub struct PullToken<'a> {
    guard: &'a PullGuard,
}

impl PullGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` if another pull already holds the guard.
    pub fn try_acquire(&self) -> Option<PullToken<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PullToken { guard: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for PullToken<'_> {
    fn drop(&mut self) {
        self.guard.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_holder_released_on_drop() {
        let guard = PullGuard::new();
        let token = guard.try_acquire().unwrap();
        assert!(guard.is_held());
        assert!(guard.try_acquire().is_none());
        drop(token);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_some());
    }
}
