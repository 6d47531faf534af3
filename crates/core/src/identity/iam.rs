//! AWS IAM implementation of [`RoleClient`].

use async_trait::async_trait;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::debug;

use crate::config::AwsConfig;

use super::{IdentityError, RoleClient};

/// IAM role client.
#[derive(Debug, Clone)]
pub struct IamRoleClient {
    client: aws_sdk_iam::Client,
}

impl IamRoleClient {
    /// Wrap an existing SDK client.
    pub fn new(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS environment plus `config`.
    ///
    /// The endpoint override applies only to the delivery service, so IAM
    /// always talks to the real global endpoint.
    pub async fn from_config(config: &AwsConfig) -> Self {
        let shared = crate::aws::load_sdk_config(config).await;
        Self::new(aws_sdk_iam::Client::new(&shared))
    }
}

fn map_sdk_error<E, R>(err: SdkError<E, R>) -> IdentityError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) => IdentityError::Timeout,
        SdkError::DispatchFailure(_) => {
            IdentityError::ConnectionFailed(DisplayErrorContext(&err).to_string())
        }
        SdkError::ServiceError(_) => {
            let code = err.code().unwrap_or("Unknown").to_string();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            match code.as_str() {
                "EntityAlreadyExists" => IdentityError::AlreadyExists(message),
                "MalformedPolicyDocument" | "InvalidInput" | "ValidationError" => {
                    IdentityError::InvalidRequest(message)
                }
                _ => IdentityError::Service { code, message },
            }
        }
        _ => IdentityError::Service {
            code: "Unknown".to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

#[async_trait]
impl RoleClient for IamRoleClient {
    fn name(&self) -> &str {
        "iam"
    }

    async fn get_role(&self, name: &str) -> Result<Option<String>, IdentityError> {
        match self.client.get_role().role_name(name).send().await {
            Ok(output) => {
                let role = output.role().ok_or_else(|| {
                    IdentityError::MalformedResponse(format!("get_role {} returned no role", name))
                })?;
                Ok(Some(role.arn().to_string()))
            }
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_no_such_entity_exception())
                    .unwrap_or(false);
                if not_found {
                    debug!("IAM role {} does not exist", name);
                    Ok(None)
                } else {
                    Err(map_sdk_error(err))
                }
            }
        }
    }

    async fn create_role(&self, name: &str, trust_policy: &str) -> Result<String, IdentityError> {
        let output = self
            .client
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy)
            .send()
            .await
            .map_err(map_sdk_error)?;

        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| {
                IdentityError::MalformedResponse(format!("create_role {} returned no role", name))
            })
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), IdentityError> {
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}
