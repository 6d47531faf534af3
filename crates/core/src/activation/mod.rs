//! Waiting for a newly created pipeline to become usable.
//!
//! The waiter polls pipeline status on a fixed interval until it is
//! `Active`, it reaches a terminal state, the status query fails, the
//! attempt/time bound is exceeded, or the caller cancels.

mod config;
mod waiter;

pub use config::ActivationConfig;
pub use waiter::{ActivationError, ActivationFailureKind, ActivationReport, ActivationWaiter};
