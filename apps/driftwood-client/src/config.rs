use std::time::Duration;

use uuid::Uuid;

/// Foreground sync settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Trailing delay between the last local mutation and the reconciliation it triggers.
    pub debounce: Duration,
    /// Identifies this foreground instance in `SYNC_INITED`.
    pub instance_id: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2_000),
            instance_id: format!("fg-{}", Uuid::new_v4()),
        }
    }
}

impl ClientConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_two_second_debounce_and_unique_ids() {
        let a = ClientConfig::default();
        let b = ClientConfig::default();
        assert_eq!(a.debounce, Duration::from_millis(2_000));
        assert_ne!(a.instance_id, b.instance_id);
        let named = a.with_instance_id("tab-1");
        assert_eq!(named.instance_id, "tab-1");
    }
}
