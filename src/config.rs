//! Session configuration.
//!
//! Soft capacities for the session collections and knobs for the scanner
//! and process-discovery loop, with defaults matching the sizes the tool
//! has always shipped with.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one [`Session`](crate::session::Session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of registered patterns before OutOfMemory.
    pub max_patterns: usize,
    /// Maximum number of configured scan ranges before OutOfMemory.
    pub max_ranges: usize,
    /// Event queue bound; on overflow the queue is drained and the newest
    /// event kept.
    pub event_capacity: usize,
    /// Scratch buffer bound for chunked region reads. Also the upper limit
    /// on a single pattern's byte length.
    pub chunk_capacity: usize,
    /// Sleep between process-discovery sweeps. `None` derives the interval
    /// from the timeout (a tenth of it, at least one second).
    pub poll_interval: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_patterns: 128,
            max_ranges: 64,
            event_capacity: 64,
            chunk_capacity: 4096,
            poll_interval: None,
        }
    }
}

impl SessionConfig {
    /// The discovery sleep interval for a given timeout in seconds.
    pub fn discovery_interval(&self, timeout_secs: u64) -> Duration {
        match self.poll_interval {
            Some(interval) => interval,
            None => Duration::from_secs((timeout_secs / 10).max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_patterns, 128);
        assert_eq!(config.max_ranges, 64);
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.chunk_capacity, 4096);
        assert!(config.poll_interval.is_none());
    }

    #[test]
    fn test_discovery_interval_derivation() {
        let config = SessionConfig::default();
        // Short and unbounded timeouts poll once a second.
        assert_eq!(config.discovery_interval(0), Duration::from_secs(1));
        assert_eq!(config.discovery_interval(5), Duration::from_secs(1));
        // Longer timeouts poll a tenth of the deadline.
        assert_eq!(config.discovery_interval(60), Duration::from_secs(6));
    }

    #[test]
    fn test_explicit_interval_wins() {
        let config = SessionConfig {
            poll_interval: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        assert_eq!(config.discovery_interval(60), Duration::from_millis(5));
    }
}
