//! Time source used by anything that waits.
//!
//! Production code uses [`SystemClock`]; tests use
//! [`MockClock`](crate::testing::MockClock) so polling loops can be driven
//! without real delays.

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// A monotonic clock that can also suspend the current task.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
