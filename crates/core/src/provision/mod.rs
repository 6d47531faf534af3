//! Idempotent provisioning of the delivery role and pipeline.

mod error;
mod pipeline;
mod role;

pub use error::ProvisioningError;
pub use pipeline::{PipelineProvisioner, PipelineSpec, Provisioned, BUFFERING_INTERVAL_SECS};
pub use role::RoleProvisioner;
