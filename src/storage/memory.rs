//! In-memory storage backend

use super::state::StoreState;
use super::{CredentialStore, StoreError};
use crate::auth::{ApiKey, KeyId, Role, RoleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Non-persistent store, useful for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_role(&self, role: &Role) -> Result<Role, StoreError> {
        self.state.write().create_role(role)
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.state.read().get_role(id))
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.state.read().get_role_by_name(name))
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.state.read().list_roles())
    }

    async fn update_role(&self, role: &Role) -> Result<(), StoreError> {
        self.state.write().update_role(role)
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        self.state.write().delete_role(id)
    }

    async fn create_api_key(&self, key: &ApiKey) -> Result<ApiKey, StoreError> {
        self.state.write().create_api_key(key)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<(ApiKey, Role)>, StoreError> {
        Ok(self.state.read().find_by_token(token))
    }

    async fn get_api_key(&self, id: KeyId) -> Result<Option<ApiKey>, StoreError> {
        Ok(self.state.read().get_api_key(id))
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, StoreError> {
        Ok(self.state.read().list_api_keys())
    }

    async fn update_expiry(
        &self,
        id: KeyId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.state.write().update_expiry(id, expires_at)
    }

    async fn update_last_used(&self, id: KeyId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.state.write().update_last_used(id, at)
    }

    async fn count_by_role(&self, role_id: RoleId) -> Result<u64, StoreError> {
        Ok(self.state.read().count_by_role(role_id))
    }

    async fn delete_api_key(&self, id: KeyId) -> Result<(), StoreError> {
        self.state.write().delete_api_key(id)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
