//! Mock role client for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::identity::{IdentityError, RoleClient};

/// A recorded role creation for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRole {
    /// Role name.
    pub name: String,
    /// Trust policy JSON the role was created with.
    pub trust_policy: String,
}

/// A recorded inline policy attachment for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedPolicy {
    /// Role the policy was attached to.
    pub role: String,
    /// Inline policy name.
    pub policy: String,
    /// Policy document JSON.
    pub document: String,
}

/// Mock implementation of the RoleClient trait.
///
/// Roles live in memory. Only successful creations and attachments are
/// recorded, so a failed policy leaves the earlier ones visible.
///
/// # Example
///
/// ```rust,ignore
/// let roles = MockRoleClient::new();
/// roles.add_role("delivery_role", "arn:aws:iam::1:role/delivery_role").await;
///
/// let arn = provisioner.ensure_role("delivery_role", bucket, None).await?;
/// assert!(roles.created_roles().await.is_empty());
/// ```
#[derive(Debug)]
pub struct MockRoleClient {
    /// Role name -> ARN.
    roles: Arc<RwLock<HashMap<String, String>>>,
    created: Arc<RwLock<Vec<RecordedRole>>>,
    attached: Arc<RwLock<Vec<RecordedPolicy>>>,
    get_count: Arc<RwLock<usize>>,
    lookup_error: Arc<RwLock<Option<IdentityError>>>,
    create_error: Arc<RwLock<Option<IdentityError>>>,
    /// Policy name -> error returned when attaching it.
    policy_errors: Arc<RwLock<HashMap<String, IdentityError>>>,
}

impl Default for MockRoleClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRoleClient {
    /// Create a new mock role client with no roles.
    pub fn new() -> Self {
        Self {
            roles: Arc::new(RwLock::new(HashMap::new())),
            created: Arc::new(RwLock::new(Vec::new())),
            attached: Arc::new(RwLock::new(Vec::new())),
            get_count: Arc::new(RwLock::new(0)),
            lookup_error: Arc::new(RwLock::new(None)),
            create_error: Arc::new(RwLock::new(None)),
            policy_errors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The ARN the mock assigns to a created role.
    pub fn arn_for(name: &str) -> String {
        format!("arn:aws:iam::000000000000:role/{}", name)
    }

    /// Pre-populate a role.
    pub async fn add_role(&self, name: &str, arn: &str) {
        self.roles
            .write()
            .await
            .insert(name.to_string(), arn.to_string());
    }

    /// Make the next lookup fail.
    pub async fn set_lookup_error(&self, error: IdentityError) {
        *self.lookup_error.write().await = Some(error);
    }

    /// Make the next role creation fail.
    pub async fn set_create_error(&self, error: IdentityError) {
        *self.create_error.write().await = Some(error);
    }

    /// Fail every attachment of the named policy.
    pub async fn set_policy_error(&self, policy_name: &str, error: IdentityError) {
        self.policy_errors
            .write()
            .await
            .insert(policy_name.to_string(), error);
    }

    /// Check if a role exists.
    pub async fn has_role(&self, name: &str) -> bool {
        self.roles.read().await.contains_key(name)
    }

    /// Number of lookups made.
    pub async fn get_count(&self) -> usize {
        *self.get_count.read().await
    }

    /// Roles created through the client.
    pub async fn created_roles(&self) -> Vec<RecordedRole> {
        self.created.read().await.clone()
    }

    /// Policies attached through the client, in call order.
    pub async fn attached_policies(&self) -> Vec<RecordedPolicy> {
        self.attached.read().await.clone()
    }
}

#[async_trait]
impl RoleClient for MockRoleClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_role(&self, name: &str) -> Result<Option<String>, IdentityError> {
        *self.get_count.write().await += 1;

        if let Some(error) = self.lookup_error.write().await.take() {
            return Err(error);
        }

        Ok(self.roles.read().await.get(name).cloned())
    }

    async fn create_role(&self, name: &str, trust_policy: &str) -> Result<String, IdentityError> {
        if let Some(error) = self.create_error.write().await.take() {
            return Err(error);
        }

        let mut roles = self.roles.write().await;
        if roles.contains_key(name) {
            return Err(IdentityError::AlreadyExists(name.to_string()));
        }

        let arn = Self::arn_for(name);
        roles.insert(name.to_string(), arn.clone());
        self.created.write().await.push(RecordedRole {
            name: name.to_string(),
            trust_policy: trust_policy.to_string(),
        });
        Ok(arn)
    }

    async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), IdentityError> {
        if let Some(error) = self.policy_errors.read().await.get(policy_name) {
            return Err(error.clone());
        }

        if !self.roles.read().await.contains_key(role_name) {
            return Err(IdentityError::InvalidRequest(format!(
                "role {} does not exist",
                role_name
            )));
        }

        self.attached.write().await.push(RecordedPolicy {
            role: role_name.to_string(),
            policy: policy_name.to_string(),
            document: document.to_string(),
        });
        Ok(())
    }
}
