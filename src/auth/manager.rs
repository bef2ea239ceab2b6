//! Authentication manager for OrbitKeys
//!
//! Service layer over a [`CredentialStore`]: role management, API key
//! lifecycle and the administrative lookups behind the root-protected
//! endpoints.

use super::gate::DEFAULT_AUTH_TIMEOUT;
use super::key::{validate_api_key, KeyError};
use super::lifecycle::{issue_api_key, ExpirationUpdate, IssueError};
use super::permissions::validate_permission_format;
use super::types::{admin_role, ApiKey, KeyId, Role, RoleId, ROLE_ADMIN};
use super::usage::LastUsedRecorder;
use crate::storage::{CredentialStore, StoreError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Authentication manager errors
#[derive(Error, Debug)]
pub enum AuthManagerError {
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Role already exists: {0}")]
    RoleAlreadyExists(String),

    #[error("Role name is required")]
    InvalidRoleName,

    #[error("Invalid permission format: {0}")]
    InvalidPermission(String),

    #[error("Invalid role reference: {0}")]
    InvalidRoleReference(RoleId),

    #[error("Role '{role}' is assigned to {keys} API key(s)")]
    RoleInUse { role: String, keys: u64 },

    #[error("API key not found: {0}")]
    KeyNotFound(KeyId),

    #[error("Invalid API key")]
    InvalidKey,

    #[error("API key expired")]
    KeyExpired,

    #[error("Lookup timed out")]
    Timeout,

    #[error("Lookup cancelled")]
    Cancelled,

    #[error("Failed to generate API key: {0}")]
    GenerationFailure(#[from] KeyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<IssueError> for AuthManagerError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::MissingRole => Self::InvalidRoleReference(0),
            IssueError::Generation(e) => Self::GenerationFailure(e),
        }
    }
}

/// Result type for auth manager operations
pub type AuthResult<T> = Result<T, AuthManagerError>;

/// Partial update for a role; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces the whole permission list
    pub permissions: Option<Vec<String>>,
}

/// Manages API keys and roles on top of a credential store
#[derive(Clone)]
pub struct AuthManager {
    store: Arc<dyn CredentialStore>,
    recorder: LastUsedRecorder,
    lookup_timeout: std::time::Duration,
}

impl AuthManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            recorder: LastUsedRecorder::new(Arc::clone(&store)),
            store,
            lookup_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Time budget for a token lookup
    pub fn with_lookup_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Create the `admin` role if the store has none
    pub async fn ensure_default_admin_role(&self) -> AuthResult<Role> {
        if let Some(role) = self.store.get_role_by_name(ROLE_ADMIN).await? {
            return Ok(role);
        }

        let role = self.store.create_role(&admin_role()).await?;
        tracing::info!(role_id = role.id, "Created default admin role");
        Ok(role)
    }

    // ==================== Role Management ====================

    /// Create a new role
    ///
    /// Every permission must be well formed; duplicates are collapsed.
    pub async fn create_role(
        &self,
        name: impl Into<String>,
        permissions: Vec<String>,
        description: Option<String>,
    ) -> AuthResult<Role> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(AuthManagerError::InvalidRoleName);
        }
        validate_all(&permissions)?;

        let mut role = Role::new(name, permissions);
        if let Some(desc) = description.filter(|d| !d.is_empty()) {
            role = role.with_description(desc);
        }

        let role = self.store.create_role(&role).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthManagerError::RoleAlreadyExists(role.name.clone()),
            other => other.into(),
        })?;

        tracing::info!(role_id = role.id, name = %role.name, "Created role");
        Ok(role)
    }

    pub async fn get_role(&self, id: RoleId) -> AuthResult<Role> {
        self.store
            .get_role(id)
            .await?
            .ok_or_else(|| AuthManagerError::RoleNotFound(id.to_string()))
    }

    pub async fn get_role_by_name(&self, name: &str) -> AuthResult<Role> {
        self.store
            .get_role_by_name(name)
            .await?
            .ok_or_else(|| AuthManagerError::RoleNotFound(name.to_string()))
    }

    /// Get a role by numeric ID or by name
    pub async fn resolve_role(&self, id_or_name: &str) -> AuthResult<Role> {
        if let Ok(id) = id_or_name.parse::<RoleId>() {
            if let Some(role) = self.store.get_role(id).await? {
                return Ok(role);
            }
        }
        self.get_role_by_name(id_or_name).await
    }

    pub async fn list_roles(&self) -> AuthResult<Vec<Role>> {
        Ok(self.store.list_roles().await?)
    }

    /// Apply a partial update to a role
    pub async fn update_role(&self, id: RoleId, update: RoleUpdate) -> AuthResult<Role> {
        let mut role = self.get_role(id).await?;

        if let Some(name) = update.name.map(|n| n.trim().to_string()) {
            if !name.is_empty() {
                role.name = name;
            }
        }

        if let Some(description) = update.description.filter(|d| !d.is_empty()) {
            role.description = Some(description);
        }

        if let Some(permissions) = update.permissions {
            validate_all(&permissions)?;
            role.permissions.clear();
            for permission in permissions {
                role.add_permission(permission);
            }
        }

        role.updated_at = Utc::now();
        self.save_role(&role).await?;

        tracing::info!(role_id = role.id, name = %role.name, "Updated role");
        Ok(role)
    }

    /// Grant a single permission to a role
    pub async fn grant_permission(&self, id: RoleId, permission: &str) -> AuthResult<Role> {
        if !validate_permission_format(permission) {
            return Err(AuthManagerError::InvalidPermission(permission.to_string()));
        }

        let mut role = self.get_role(id).await?;
        if role.add_permission(permission) {
            self.save_role(&role).await?;
            tracing::info!(role_id = role.id, permission, "Granted permission");
        }
        Ok(role)
    }

    /// Remove a single permission from a role
    pub async fn revoke_permission(&self, id: RoleId, permission: &str) -> AuthResult<Role> {
        let mut role = self.get_role(id).await?;
        if role.remove_permission(permission) {
            self.save_role(&role).await?;
            tracing::info!(role_id = role.id, permission, "Revoked permission");
        }
        Ok(role)
    }

    /// Delete a role that no API key references
    pub async fn delete_role(&self, id: RoleId) -> AuthResult<()> {
        let role = self.get_role(id).await?;

        let keys = self.store.count_by_role(id).await?;
        if keys > 0 {
            return Err(AuthManagerError::RoleInUse {
                role: role.name,
                keys,
            });
        }

        self.store.delete_role(id).await?;
        tracing::info!(role_id = id, name = %role.name, "Deleted role");
        Ok(())
    }

    async fn save_role(&self, role: &Role) -> AuthResult<()> {
        self.store.update_role(role).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthManagerError::RoleAlreadyExists(role.name.clone()),
            StoreError::RoleNotFound(id) => AuthManagerError::RoleNotFound(id.to_string()),
            other => other.into(),
        })
    }

    // ==================== API Key Management ====================

    /// Issue and store a new API key for an existing role
    ///
    /// The returned record carries the full token; it is only shown once.
    pub async fn create_api_key(
        &self,
        role_id: RoleId,
        description: impl Into<String>,
        custom_data: Option<String>,
        ttl: Option<Duration>,
    ) -> AuthResult<ApiKey> {
        if role_id == 0 || self.store.get_role(role_id).await?.is_none() {
            return Err(AuthManagerError::InvalidRoleReference(role_id));
        }

        let key = issue_api_key(role_id, description, custom_data, ttl)?;
        let key = self.store.create_api_key(&key).await?;

        tracing::info!(key_id = key.id, role_id, expires_at = ?key.expires_at, "Created API key");
        Ok(key)
    }

    pub async fn get_api_key(&self, id: KeyId) -> AuthResult<ApiKey> {
        self.store
            .get_api_key(id)
            .await?
            .ok_or(AuthManagerError::KeyNotFound(id))
    }

    pub async fn list_api_keys(&self) -> AuthResult<Vec<ApiKey>> {
        Ok(self.store.list_api_keys().await?)
    }

    /// Change or remove a key's expiry
    pub async fn update_api_key_expiration(
        &self,
        id: KeyId,
        update: ExpirationUpdate,
    ) -> AuthResult<ApiKey> {
        let mut key = self.get_api_key(id).await?;
        key.expires_at = update.resolve(Utc::now());

        self.store
            .update_expiry(id, key.expires_at)
            .await
            .map_err(|e| match e {
                StoreError::ApiKeyNotFound(id) => AuthManagerError::KeyNotFound(id),
                other => other.into(),
            })?;

        tracing::info!(key_id = id, expires_at = ?key.expires_at, "Updated API key expiration");
        Ok(key)
    }

    /// Revoke (delete) an API key
    pub async fn revoke_api_key(&self, id: KeyId) -> AuthResult<()> {
        self.store.delete_api_key(id).await.map_err(|e| match e {
            StoreError::ApiKeyNotFound(id) => AuthManagerError::KeyNotFound(id),
            other => other.into(),
        })?;

        tracing::info!(key_id = id, "Revoked API key");
        Ok(())
    }

    // ==================== Administrative lookups ====================

    /// Find a key and its role by token, recording the use
    ///
    /// Malformed and unknown tokens both yield [`AuthManagerError::InvalidKey`].
    pub async fn lookup_api_key(&self, token: &str) -> AuthResult<(ApiKey, Role)> {
        self.lookup_api_key_with_cancel(token, &CancellationToken::new())
            .await
    }

    /// Like [`lookup_api_key`](Self::lookup_api_key), giving up as soon as
    /// `cancel` fires or the lookup budget runs out
    pub async fn lookup_api_key_with_cancel(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> AuthResult<(ApiKey, Role)> {
        if !validate_api_key(token) {
            return Err(AuthManagerError::InvalidKey);
        }

        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuthManagerError::Cancelled),
            found = tokio::time::timeout(self.lookup_timeout, self.store.find_by_token(token)) => {
                found.map_err(|_| AuthManagerError::Timeout)??
            }
        };
        let (key, role) = found.ok_or(AuthManagerError::InvalidKey)?;

        let now = Utc::now();
        if key.is_expired_at(now) {
            return Err(AuthManagerError::KeyExpired);
        }

        self.recorder.record(key.id, now);
        Ok((key, role))
    }

    /// Whether the key behind `token` grants `permission`
    pub async fn check_api_key_permission(
        &self,
        token: &str,
        permission: &str,
    ) -> AuthResult<bool> {
        self.check_api_key_permission_with_cancel(token, permission, &CancellationToken::new())
            .await
    }

    pub async fn check_api_key_permission_with_cancel(
        &self,
        token: &str,
        permission: &str,
        cancel: &CancellationToken,
    ) -> AuthResult<bool> {
        let (_, role) = self.lookup_api_key_with_cancel(token, cancel).await?;
        Ok(role.has_permission(permission))
    }
}

fn validate_all(permissions: &[String]) -> AuthResult<()> {
    match permissions.iter().find(|p| !validate_permission_format(p)) {
        Some(bad) => Err(AuthManagerError::InvalidPermission(bad.clone())),
        None => Ok(()),
    }
}
