//! Error types for the provision module.

use thiserror::Error;

use crate::delivery::DeliveryError;
use crate::identity::IdentityError;

/// Errors that can occur while provisioning the role or the pipeline.
///
/// None of these trigger cleanup: whatever was created before the failure
/// is left in place for inspection.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The pipeline spec violates its own invariants.
    #[error("Invalid pipeline spec: {0}")]
    InvalidSpec(String),

    /// Looking up the role failed for a reason other than absence.
    #[error("Failed to look up role {role}: {source}")]
    RoleLookup {
        role: String,
        #[source]
        source: IdentityError,
    },

    /// Creating the role failed.
    #[error("Failed to create role {role}: {source}")]
    RoleCreate {
        role: String,
        #[source]
        source: IdentityError,
    },

    /// A policy document could not be serialized.
    #[error("Failed to encode policy {policy}: {source}")]
    PolicyEncode {
        policy: String,
        #[source]
        source: serde_json::Error,
    },

    /// Attaching an inline policy to the role failed.
    #[error("Failed to attach policy {policy} to role {role}: {source}")]
    PolicyAttach {
        role: String,
        policy: String,
        #[source]
        source: IdentityError,
    },

    /// Looking up the pipeline failed for a reason other than absence.
    #[error("Failed to look up pipeline {pipeline}: {source}")]
    PipelineLookup {
        pipeline: String,
        #[source]
        source: DeliveryError,
    },

    /// Creating the pipeline failed.
    #[error("Failed to create pipeline {pipeline}: {source}")]
    PipelineCreate {
        pipeline: String,
        #[source]
        source: DeliveryError,
    },
}
