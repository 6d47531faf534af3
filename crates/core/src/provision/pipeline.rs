//! Delivery pipeline provisioning.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::delivery::{CreatePipelineRequest, DeliveryClient, PipelineStatus, SourceMode};
use crate::metrics;

use super::error::ProvisioningError;
use super::role::RoleProvisioner;

/// Sink buffering interval for every pipeline we create. Shorter than the
/// service default of 300s to keep end-to-end latency low.
pub const BUFFERING_INTERVAL_SECS: u32 = 60;

/// Desired state of a delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Pipeline name.
    pub name: String,
    /// Sink bucket identifier (ARN).
    pub bucket_arn: String,
    /// Name of the role the pipeline assumes.
    pub role_name: String,
    /// Source configuration.
    pub source: SourceMode,
}

impl PipelineSpec {
    /// Spec for a pipeline fed by direct pushes.
    pub fn direct_push(
        name: impl Into<String>,
        bucket_arn: impl Into<String>,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bucket_arn: bucket_arn.into(),
            role_name: role_name.into(),
            source: SourceMode::DirectPush,
        }
    }

    /// Spec for a pipeline that reads from an upstream stream.
    pub fn stream_fed(
        name: impl Into<String>,
        bucket_arn: impl Into<String>,
        role_name: impl Into<String>,
        stream_arn: impl Into<String>,
    ) -> Self {
        Self {
            source: SourceMode::StreamFed {
                stream_arn: stream_arn.into(),
            },
            ..Self::direct_push(name, bucket_arn, role_name)
        }
    }

    /// Check the spec's own invariants.
    pub fn validate(&self) -> Result<(), ProvisioningError> {
        if self.name.trim().is_empty() {
            return Err(ProvisioningError::InvalidSpec(
                "pipeline name cannot be empty".to_string(),
            ));
        }
        if self.bucket_arn.trim().is_empty() {
            return Err(ProvisioningError::InvalidSpec(
                "bucket ARN cannot be empty".to_string(),
            ));
        }
        if self.role_name.trim().is_empty() {
            return Err(ProvisioningError::InvalidSpec(
                "role name cannot be empty".to_string(),
            ));
        }
        if let SourceMode::StreamFed { stream_arn } = &self.source {
            if stream_arn.trim().is_empty() {
                return Err(ProvisioningError::InvalidSpec(
                    "stream-fed pipeline requires an upstream stream ARN".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Result of [`PipelineProvisioner::ensure_pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// The pipeline already existed. No role or create calls were made.
    Existing { arn: String, status: PipelineStatus },
    /// The pipeline was created by this call.
    Created { arn: String },
}

impl Provisioned {
    /// Pipeline identifier.
    pub fn arn(&self) -> &str {
        match self {
            Provisioned::Existing { arn, .. } | Provisioned::Created { arn } => arn,
        }
    }

    /// Whether this call created the pipeline.
    pub fn was_created(&self) -> bool {
        matches!(self, Provisioned::Created { .. })
    }
}

/// Ensures a delivery pipeline exists, creating it and its role if needed.
pub struct PipelineProvisioner {
    delivery: Arc<dyn DeliveryClient>,
    roles: RoleProvisioner,
}

impl PipelineProvisioner {
    /// Create a provisioner.
    pub fn new(delivery: Arc<dyn DeliveryClient>, roles: RoleProvisioner) -> Self {
        Self { delivery, roles }
    }

    /// Return the pipeline named in `spec`, creating it if absent.
    ///
    /// Existence is checked by name only. An existing pipeline is returned
    /// without comparing its configuration against `spec`; the rest of the
    /// spec is validated only when a pipeline has to be created.
    pub async fn ensure_pipeline(
        &self,
        spec: &PipelineSpec,
    ) -> Result<Provisioned, ProvisioningError> {
        if spec.name.trim().is_empty() {
            return Err(ProvisioningError::InvalidSpec(
                "pipeline name cannot be empty".to_string(),
            ));
        }

        let existing = self.delivery.describe(&spec.name).await.map_err(|source| {
            ProvisioningError::PipelineLookup {
                pipeline: spec.name.clone(),
                source,
            }
        })?;

        if let Some(description) = existing {
            info!(
                "Pipeline {} already exists ({}, {})",
                spec.name,
                description.arn,
                description.status.as_str()
            );
            metrics::PROVISIONING_TOTAL
                .with_label_values(&["pipeline", "existing"])
                .inc();
            return Ok(Provisioned::Existing {
                arn: description.arn,
                status: description.status,
            });
        }

        let result = self.create(spec).await;
        let label = if result.is_ok() { "created" } else { "failed" };
        metrics::PROVISIONING_TOTAL
            .with_label_values(&["pipeline", label])
            .inc();
        result
    }

    async fn create(&self, spec: &PipelineSpec) -> Result<Provisioned, ProvisioningError> {
        spec.validate()?;

        let role_arn = self
            .roles
            .ensure_role(
                &spec.role_name,
                &spec.bucket_arn,
                spec.source.upstream_stream(),
            )
            .await?;

        let request = CreatePipelineRequest {
            name: spec.name.clone(),
            bucket_arn: spec.bucket_arn.clone(),
            role_arn,
            source: spec.source.clone(),
            buffering_interval_secs: BUFFERING_INTERVAL_SECS,
        };

        let arn = self.delivery.create(&request).await.map_err(|source| {
            ProvisioningError::PipelineCreate {
                pipeline: spec.name.clone(),
                source,
            }
        })?;

        info!(
            "Created {} pipeline {} ({})",
            spec.source.as_str(),
            spec.name,
            arn
        );
        Ok(Provisioned::Created { arn })
    }
}
