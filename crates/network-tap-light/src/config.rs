//! Configuration types for the network activity monitor.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Maximum number of completed events retained; oldest are evicted first.
    pub capacity: usize,
    /// Trailing window used when a caller does not supply one.
    pub idle_window_ms: u64,
    /// Upper bound on the idle check interval.
    pub poll_interval_ms: u64,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            idle_window_ms: 500,
            poll_interval_ms: 50,
        }
    }
}
