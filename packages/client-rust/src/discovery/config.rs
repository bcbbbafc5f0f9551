//! Configuration for the static discovery registry.

use std::time::Duration;

/// Controls watcher queue depth and how long a full watcher may hold up
/// one update before it is dropped for that watcher.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Capacity of each watcher's bounded queue, in full server lists.
    /// Values below 1 are treated as 1.
    pub watcher_capacity: usize,
    /// Maximum time a delivery task waits for room in a full watcher queue.
    pub delivery_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            watcher_capacity: 10,
            delivery_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_config_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.watcher_capacity, 10);
        assert_eq!(config.delivery_timeout, Duration::from_secs(60));
    }
}
