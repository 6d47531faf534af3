//! Delivery role provisioning.

use std::sync::Arc;

use tracing::{debug, info};

use crate::identity::{RoleClient, RoleSpec};
use crate::metrics;

use super::error::ProvisioningError;

/// Ensures the access-control role used by a delivery pipeline exists.
pub struct RoleProvisioner {
    client: Arc<dyn RoleClient>,
}

impl RoleProvisioner {
    /// Create a provisioner backed by `client`.
    pub fn new(client: Arc<dyn RoleClient>) -> Self {
        Self { client }
    }

    /// Return the identifier of role `name`, creating it if absent.
    ///
    /// An existing role is returned as-is; its trust policy and permissions
    /// are not inspected. A new role gets the delivery trust policy, write
    /// access to `bucket_arn`, and read access to `upstream_stream` when
    /// one is given.
    pub async fn ensure_role(
        &self,
        name: &str,
        bucket_arn: &str,
        upstream_stream: Option<&str>,
    ) -> Result<String, ProvisioningError> {
        let existing = self
            .client
            .get_role(name)
            .await
            .map_err(|source| ProvisioningError::RoleLookup {
                role: name.to_string(),
                source,
            })?;

        if let Some(arn) = existing {
            info!("Using existing role {} ({})", name, arn);
            metrics::PROVISIONING_TOTAL
                .with_label_values(&["role", "existing"])
                .inc();
            return Ok(arn);
        }

        let spec = RoleSpec::for_delivery(name, bucket_arn, upstream_stream);
        let result = self.create(&spec).await;
        let label = if result.is_ok() { "created" } else { "failed" };
        metrics::PROVISIONING_TOTAL
            .with_label_values(&["role", label])
            .inc();
        result
    }

    /// Create the role described by `spec` and attach its permissions.
    async fn create(&self, spec: &RoleSpec) -> Result<String, ProvisioningError> {
        let trust = spec
            .trust_policy
            .to_json()
            .map_err(|source| ProvisioningError::PolicyEncode {
                policy: "trust".to_string(),
                source,
            })?;

        let arn = self
            .client
            .create_role(&spec.name, &trust)
            .await
            .map_err(|source| ProvisioningError::RoleCreate {
                role: spec.name.clone(),
                source,
            })?;
        info!("Created role {} ({})", spec.name, arn);

        for policy in &spec.permissions {
            let document =
                policy
                    .document
                    .to_json()
                    .map_err(|source| ProvisioningError::PolicyEncode {
                        policy: policy.name.clone(),
                        source,
                    })?;

            self.client
                .put_role_policy(&spec.name, &policy.name, &document)
                .await
                .map_err(|source| ProvisioningError::PolicyAttach {
                    role: spec.name.clone(),
                    policy: policy.name.clone(),
                    source,
                })?;
            debug!("Attached policy {} to role {}", policy.name, spec.name);
        }

        Ok(arn)
    }
}
