//! Activation waiter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds for waiting on a newly created pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Delay between status polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up after this many status polls.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Give up once another poll would start after this many seconds.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

fn default_poll_interval() -> u64 {
    2000 // 2 seconds
}

fn default_max_attempts() -> u32 {
    150
}

fn default_max_wait() -> u64 {
    600 // 10 minutes
}

impl ActivationConfig {
    /// Delay between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on total wait.
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            max_wait_secs: default_max_wait(),
        }
    }
}
