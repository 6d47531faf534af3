//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// Most records the transport accepts in one batch call.
pub const MAX_BATCH_SIZE: usize = 500;

/// Configuration for the batch dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Records per batch submission (1..=500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batch submissions allowed in flight at once. 1 sends strictly in order.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_batches: usize,
}

fn default_batch_size() -> usize {
    100
}

fn default_max_in_flight() -> usize {
    1
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_in_flight_batches: default_max_in_flight(),
        }
    }
}
