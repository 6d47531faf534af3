//! Types for access-control role operations.

use async_trait::async_trait;
use thiserror::Error;

use super::policy::{self, PolicyDocument};

/// Errors returned by the identity service.
///
/// "Role does not exist" is not an error: [`RoleClient::get_role`] reports
/// it as `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Role already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request timeout")]
    Timeout,
}

/// An inline permission policy attached to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePolicy {
    /// Policy name, unique per role.
    pub name: String,
    /// Policy document.
    pub document: PolicyDocument,
}

/// Desired state of the delivery role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    /// Role name.
    pub name: String,
    /// Who may assume the role.
    pub trust_policy: PolicyDocument,
    /// Permission statements, attached in order. Attaching never removes
    /// policies the role already has.
    pub permissions: Vec<InlinePolicy>,
}

impl RoleSpec {
    /// Role for a delivery pipeline writing to `bucket_arn`, optionally
    /// reading from `upstream_stream`.
    pub fn for_delivery(
        name: impl Into<String>,
        bucket_arn: &str,
        upstream_stream: Option<&str>,
    ) -> Self {
        let mut permissions = vec![InlinePolicy {
            name: policy::BUCKET_POLICY_NAME.to_string(),
            document: policy::bucket_access_policy(bucket_arn),
        }];
        if let Some(stream_arn) = upstream_stream {
            permissions.push(InlinePolicy {
                name: policy::STREAM_POLICY_NAME.to_string(),
                document: policy::stream_read_policy(stream_arn),
            });
        }

        Self {
            name: name.into(),
            trust_policy: policy::trust_policy(),
            permissions,
        }
    }
}

/// An identity and access management service.
#[async_trait]
pub trait RoleClient: Send + Sync {
    /// Returns the name of this backend (for logging).
    fn name(&self) -> &str;

    /// Look up a role by name. Returns its identifier (ARN), or `None` if it
    /// does not exist.
    async fn get_role(&self, name: &str) -> Result<Option<String>, IdentityError>;

    /// Create a role with the given trust policy JSON. Returns its identifier.
    async fn create_role(&self, name: &str, trust_policy: &str) -> Result<String, IdentityError>;

    /// Attach (or overwrite) an inline policy on a role.
    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), IdentityError>;
}
