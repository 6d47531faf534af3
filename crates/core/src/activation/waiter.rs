//! Activation waiter implementation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::delivery::{DeliveryClient, DeliveryError, PipelineStatus};
use crate::metrics;

use super::config::ActivationConfig;

/// Why waiting for activation failed.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// Still not active when the attempt or time bound ran out.
    #[error("Pipeline {pipeline} not active after {attempts} polls ({elapsed:?})")]
    Timeout {
        pipeline: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// The pipeline is being deleted.
    #[error("Pipeline {pipeline} is being deleted")]
    Deleting { pipeline: String },

    /// The service reports creation (or deletion) failed.
    #[error("Pipeline {pipeline} failed on the service side")]
    Failed { pipeline: String },

    /// The pipeline vanished while we were waiting for it.
    #[error("Pipeline {pipeline} no longer exists")]
    NotFound { pipeline: String },

    /// The status query itself failed. Not retried.
    #[error("Status query for pipeline {pipeline} failed: {source}")]
    StatusQuery {
        pipeline: String,
        #[source]
        source: DeliveryError,
    },

    /// The caller cancelled the wait.
    #[error("Waiting for pipeline {pipeline} was cancelled")]
    Cancelled { pipeline: String },
}

/// Coarse classification of an [`ActivationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFailureKind {
    /// The bound was exceeded while the pipeline was still coming up.
    Timeout,
    /// The pipeline can never become active, or its state cannot be observed.
    Terminal,
    /// The wait was cancelled.
    Cancelled,
}

impl ActivationFailureKind {
    /// Returns the string representation for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationFailureKind::Timeout => "timeout",
            ActivationFailureKind::Terminal => "terminal",
            ActivationFailureKind::Cancelled => "cancelled",
        }
    }
}

impl ActivationError {
    /// Error for a pipeline observed in a terminal status.
    fn terminal(pipeline: &str, status: PipelineStatus) -> Self {
        let pipeline = pipeline.to_string();
        match status {
            PipelineStatus::Deleting => ActivationError::Deleting { pipeline },
            _ => ActivationError::Failed { pipeline },
        }
    }

    /// Classify this failure.
    pub fn kind(&self) -> ActivationFailureKind {
        match self {
            ActivationError::Timeout { .. } => ActivationFailureKind::Timeout,
            ActivationError::Cancelled { .. } => ActivationFailureKind::Cancelled,
            ActivationError::Deleting { .. }
            | ActivationError::Failed { .. }
            | ActivationError::NotFound { .. }
            | ActivationError::StatusQuery { .. } => ActivationFailureKind::Terminal,
        }
    }
}

/// Successful wait summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Status polls issued, including the one that saw `Active`.
    pub attempts: u32,
    /// Time spent waiting.
    pub elapsed: Duration,
}

/// Polls a pipeline until it becomes active.
pub struct ActivationWaiter {
    delivery: Arc<dyn DeliveryClient>,
    clock: Arc<dyn Clock>,
    config: ActivationConfig,
}

impl ActivationWaiter {
    /// Create a waiter.
    pub fn new(
        delivery: Arc<dyn DeliveryClient>,
        clock: Arc<dyn Clock>,
        config: ActivationConfig,
    ) -> Self {
        Self {
            delivery,
            clock,
            config,
        }
    }

    /// Wait for pipeline `name` to become `Active`.
    ///
    /// Returns as soon as a poll sees `Active`. `Deleting`, a service-side
    /// failure, disappearance, and a failed status query all end the wait
    /// immediately. `Creating` and unrecognised statuses keep polling until
    /// `max_attempts` polls have been made or the next poll would start
    /// after `max_wait`.
    pub async fn await_active(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ActivationReport, ActivationError> {
        let result = self.poll_until_active(name, cancel).await;
        let outcome = match &result {
            Ok(_) => "active",
            Err(e) => e.kind().as_str(),
        };
        metrics::ACTIVATION_OUTCOMES
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn poll_until_active(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ActivationReport, ActivationError> {
        let started = self.clock.now();
        let interval = self.config.poll_interval();
        let max_wait = self.config.max_wait();
        let mut attempts = 0u32;

        info!("Waiting for pipeline {} to become active", name);

        loop {
            if cancel.is_cancelled() {
                warn!("Activation wait for {} cancelled", name);
                return Err(ActivationError::Cancelled {
                    pipeline: name.to_string(),
                });
            }

            attempts += 1;
            metrics::ACTIVATION_POLLS.inc();

            let status = match self.delivery.describe(name).await {
                Ok(Some(description)) => description.status,
                Ok(None) => {
                    error!("Pipeline {} disappeared while waiting for activation", name);
                    return Err(ActivationError::NotFound {
                        pipeline: name.to_string(),
                    });
                }
                Err(source) => {
                    error!("Status query for pipeline {} failed: {}", name, source);
                    return Err(ActivationError::StatusQuery {
                        pipeline: name.to_string(),
                        source,
                    });
                }
            };

            let elapsed = self.clock.now().duration_since(started);

            match status {
                PipelineStatus::Active => {
                    info!(
                        "Pipeline {} active after {} polls ({:?})",
                        name, attempts, elapsed
                    );
                    return Ok(ActivationReport { attempts, elapsed });
                }
                terminal if terminal.is_terminal() => {
                    error!("Pipeline {} is {}, giving up", name, terminal.as_str());
                    return Err(ActivationError::terminal(name, terminal));
                }
                _ => {}
            }

            if attempts >= self.config.max_attempts || elapsed + interval > max_wait {
                warn!(
                    "Pipeline {} still {} after {} polls ({:?})",
                    name,
                    status.as_str(),
                    attempts,
                    elapsed
                );
                return Err(ActivationError::Timeout {
                    pipeline: name.to_string(),
                    attempts,
                    elapsed,
                });
            }

            debug!(
                "Pipeline {} is {}, polling again in {:?}",
                name,
                status.as_str(),
                interval
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Activation wait for {} cancelled", name);
                    return Err(ActivationError::Cancelled {
                        pipeline: name.to_string(),
                    });
                }
                _ = self.clock.sleep(interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClock, MockDeliveryClient};

    fn waiter(
        delivery: &Arc<MockDeliveryClient>,
        clock: &Arc<MockClock>,
        config: ActivationConfig,
    ) -> ActivationWaiter {
        ActivationWaiter::new(delivery.clone(), clock.clone(), config)
    }

    #[tokio::test]
    async fn test_active_immediately() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery.add_pipeline("events", PipelineStatus::Active).await;
        let clock = Arc::new(MockClock::new());

        let report = waiter(&delivery, &clock, ActivationConfig::default())
            .await_active("events", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.attempts, 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_creating_then_active() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery
            .add_pipeline_with_statuses(
                "events",
                vec![
                    PipelineStatus::Creating,
                    PipelineStatus::Creating,
                    PipelineStatus::Active,
                ],
            )
            .await;
        let clock = Arc::new(MockClock::new());

        let report = waiter(&delivery, &clock, ActivationConfig::default())
            .await_active("events", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.elapsed, Duration::from_secs(4));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn test_deleting_fails_without_further_polling() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery
            .add_pipeline_with_statuses(
                "events",
                vec![PipelineStatus::Deleting, PipelineStatus::Active],
            )
            .await;
        let clock = Arc::new(MockClock::new());

        let err = waiter(&delivery, &clock, ActivationConfig::default())
            .await_active("events", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ActivationError::Deleting { .. }));
        assert_eq!(err.kind(), ActivationFailureKind::Terminal);
        assert_eq!(delivery.describe_count().await, 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_is_terminal() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery
            .add_pipeline_with_statuses(
                "events",
                vec![
                    PipelineStatus::Creating,
                    PipelineStatus::Failed,
                    PipelineStatus::Active,
                ],
            )
            .await;
        let clock = Arc::new(MockClock::new());

        let err = waiter(&delivery, &clock, ActivationConfig::default())
            .await_active("events", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ActivationError::Failed { .. }));
        assert_eq!(err.kind(), ActivationFailureKind::Terminal);
        assert_eq!(delivery.describe_count().await, 2);
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn test_status_query_failure_is_not_retried() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery.add_pipeline("events", PipelineStatus::Creating).await;
        delivery
            .push_describe_error(DeliveryError::ConnectionFailed("reset".to_string()))
            .await;
        let clock = Arc::new(MockClock::new());

        let err = waiter(&delivery, &clock, ActivationConfig::default())
            .await_active("events", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ActivationError::StatusQuery { .. }));
        assert_eq!(err.kind(), ActivationFailureKind::Terminal);
        assert_eq!(delivery.describe_count().await, 1);
    }

    #[tokio::test]
    async fn test_timeout_by_attempts() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery.add_pipeline("events", PipelineStatus::Creating).await;
        let clock = Arc::new(MockClock::new());
        let config = ActivationConfig {
            max_attempts: 5,
            ..Default::default()
        };

        let err = waiter(&delivery, &clock, config)
            .await_active("events", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ActivationError::Timeout { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(delivery.describe_count().await, 5);
        assert_eq!(clock.sleeps().len(), 4);
    }

    #[tokio::test]
    async fn test_timeout_by_duration() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery.add_pipeline("events", PipelineStatus::Unknown).await;
        let clock = Arc::new(MockClock::new());
        let config = ActivationConfig {
            poll_interval_ms: 2000,
            max_attempts: 100,
            max_wait_secs: 5,
        };

        let err = waiter(&delivery, &clock, config)
            .await_active("events", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ActivationFailureKind::Timeout);
        match err {
            ActivationError::Timeout {
                attempts, elapsed, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(elapsed, Duration::from_secs(4));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_vanished_pipeline_is_terminal() {
        let delivery = Arc::new(MockDeliveryClient::new());
        let clock = Arc::new(MockClock::new());

        let err = waiter(&delivery, &clock, ActivationConfig::default())
            .await_active("ghost", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ActivationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_polling() {
        let delivery = Arc::new(MockDeliveryClient::new());
        delivery.add_pipeline("events", PipelineStatus::Creating).await;
        let clock = Arc::new(MockClock::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = waiter(&delivery, &clock, ActivationConfig::default())
            .await_active("events", &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ActivationFailureKind::Cancelled);
        assert_eq!(delivery.describe_count().await, 0);
    }
}
