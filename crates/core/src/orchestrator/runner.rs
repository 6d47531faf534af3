//! Ingest orchestrator implementation.
//!
//! One run is strictly sequential: ensure the pipeline exists, wait for a
//! newly created pipeline to become active, then dispatch every record.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::activation::{ActivationConfig, ActivationWaiter};
use crate::clock::Clock;
use crate::config::Config;
use crate::delivery::DeliveryClient;
use crate::dispatch::{BatchDispatcher, DispatchConfig, RecordSource};
use crate::identity::RoleClient;
use crate::provision::{PipelineProvisioner, PipelineSpec, Provisioned, RoleProvisioner};

use super::types::{OrchestratorError, RunSummary};

/// Drives one ingest run from provisioning to the last batch.
pub struct IngestOrchestrator {
    provisioner: PipelineProvisioner,
    waiter: ActivationWaiter,
    dispatcher: BatchDispatcher,
}

impl IngestOrchestrator {
    /// Create an orchestrator over the given service clients.
    pub fn new(
        roles: Arc<dyn RoleClient>,
        delivery: Arc<dyn DeliveryClient>,
        clock: Arc<dyn Clock>,
        activation: ActivationConfig,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            provisioner: PipelineProvisioner::new(delivery.clone(), RoleProvisioner::new(roles)),
            waiter: ActivationWaiter::new(delivery.clone(), clock, activation),
            dispatcher: BatchDispatcher::new(delivery, dispatch),
        }
    }

    /// Create an orchestrator using the activation and dispatch sections of
    /// `config`.
    pub fn from_config(
        roles: Arc<dyn RoleClient>,
        delivery: Arc<dyn DeliveryClient>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self::new(
            roles,
            delivery,
            clock,
            config.activation.clone(),
            config.dispatch.clone(),
        )
    }

    /// Run one ingest: provision if absent, wait if just created, dispatch.
    ///
    /// A pipeline that already existed is assumed usable and is not polled.
    /// Permanently failed records do not make the run fail; they are in the
    /// returned summary. Cancellation during dispatch also returns a summary,
    /// marked cancelled.
    pub async fn run(
        &self,
        spec: &PipelineSpec,
        source: &dyn RecordSource,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, OrchestratorError> {
        let run_id = Uuid::new_v4().to_string();
        info!(
            "Run {} starting: {} -> pipeline {} ({})",
            run_id,
            source.describe(),
            spec.name,
            spec.source.as_str()
        );

        let result = self.run_stages(&run_id, spec, source, cancel).await;
        match &result {
            Ok(summary) if summary.dispatch.cancelled => {
                warn!(
                    "Run {} cancelled after {} records",
                    run_id, summary.dispatch.total_records
                );
            }
            Ok(summary) => {
                info!(
                    "Run {} finished: {} delivered, {} permanently failed",
                    run_id,
                    summary.dispatch.delivered(),
                    summary.dispatch.permanent_failures()
                );
            }
            Err(e) => {
                error!("Run {} failed ({}): {}", run_id, e.kind().as_str(), e);
            }
        }
        result
    }

    async fn run_stages(
        &self,
        run_id: &str,
        spec: &PipelineSpec,
        source: &dyn RecordSource,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, OrchestratorError> {
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let provisioned = self.provisioner.ensure_pipeline(spec).await?;

        let activation = match &provisioned {
            Provisioned::Created { .. } => {
                let report = self.waiter.await_active(&spec.name, cancel).await?;
                Some(report)
            }
            Provisioned::Existing { .. } => None,
        };

        let dispatch = self.dispatcher.dispatch(&spec.name, source, cancel).await?;

        Ok(RunSummary {
            run_id: run_id.to_string(),
            pipeline: spec.name.clone(),
            pipeline_arn: provisioned.arn().to_string(),
            created: provisioned.was_created(),
            activation,
            dispatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationError;
    use crate::delivery::{DeliveryError, PipelineStatus};
    use crate::orchestrator::FailureKind;
    use crate::testing::{fixtures, MockClock, MockDeliveryClient, MockRoleClient};

    struct Harness {
        roles: Arc<MockRoleClient>,
        delivery: Arc<MockDeliveryClient>,
        clock: Arc<MockClock>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                roles: Arc::new(MockRoleClient::new()),
                delivery: Arc::new(MockDeliveryClient::new()),
                clock: Arc::new(MockClock::new()),
            }
        }

        fn orchestrator(&self) -> IngestOrchestrator {
            IngestOrchestrator::new(
                self.roles.clone(),
                self.delivery.clone(),
                self.clock.clone(),
                ActivationConfig {
                    max_attempts: 5,
                    ..Default::default()
                },
                DispatchConfig::default(),
            )
        }
    }

    #[tokio::test]
    async fn test_existing_pipeline_skips_provisioning_and_wait() {
        let h = Harness::new();
        h.delivery.add_pipeline("events", PipelineStatus::Active).await;

        let summary = h
            .orchestrator()
            .run(
                &fixtures::direct_push_spec("events"),
                &fixtures::numbered_records(3),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!summary.created);
        assert!(summary.activation.is_none());
        assert_eq!(summary.dispatch.delivered(), 3);
        assert!(h.delivery.create_requests().await.is_empty());
        assert_eq!(h.roles.get_count().await, 0);
        assert!(h.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_new_pipeline_is_created_then_awaited() {
        let h = Harness::new();

        let summary = h
            .orchestrator()
            .run(
                &fixtures::direct_push_spec("events"),
                &fixtures::numbered_records(3),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(summary.created);
        assert_eq!(summary.activation.map(|a| a.attempts), Some(2));
        assert_eq!(h.clock.sleeps().len(), 1);
        assert_eq!(h.delivery.batch_calls().await.len(), 1);
        assert!(summary.is_clean());
    }

    #[tokio::test]
    async fn test_stream_fed_pipeline_gets_stream_policy() {
        let h = Harness::new();
        h.delivery
            .set_post_create_statuses(vec![PipelineStatus::Active])
            .await;

        let summary = h
            .orchestrator()
            .run(
                &fixtures::stream_fed_spec("clicks"),
                &fixtures::numbered_records(2),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(summary.created);
        let requests = h.delivery.create_requests().await;
        assert_eq!(
            requests[0].source.upstream_stream(),
            Some(fixtures::STREAM_ARN)
        );
        let attached = h.roles.attached_policies().await;
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0].role, "clicks_role");
    }

    #[tokio::test]
    async fn test_deleting_pipeline_aborts_before_dispatch() {
        let h = Harness::new();
        h.delivery
            .set_post_create_statuses(vec![PipelineStatus::Creating, PipelineStatus::Deleting])
            .await;

        let err = h
            .orchestrator()
            .run(
                &fixtures::direct_push_spec("events"),
                &fixtures::numbered_records(3),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Activation(ActivationError::Deleting { .. })
        ));
        assert_eq!(err.kind(), FailureKind::ActivationTerminal);
        assert!(h.delivery.batch_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_activation_timeout() {
        let h = Harness::new();
        h.delivery
            .set_post_create_statuses(vec![PipelineStatus::Creating])
            .await;

        let err = h
            .orchestrator()
            .run(
                &fixtures::direct_push_spec("events"),
                &fixtures::numbered_records(3),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::ActivationTimeout);
        assert_eq!(err.exit_code(), 3);
        assert!(h.delivery.batch_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let h = Harness::new();
        h.delivery.add_pipeline("events", PipelineStatus::Active).await;
        h.delivery
            .fail_batch(0, DeliveryError::ConnectionFailed("reset".to_string()))
            .await;

        let err = h
            .orchestrator()
            .run(
                &fixtures::direct_push_spec("events"),
                &fixtures::numbered_records(3),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Transport);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let h = Harness::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .orchestrator()
            .run(
                &fixtures::direct_push_spec("events"),
                &fixtures::numbered_records(3),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Cancelled));
        assert_eq!(h.delivery.describe_count().await, 0);
    }
}
