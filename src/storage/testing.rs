//! Store doubles shared by unit tests

use super::{CredentialStore, MemoryStore, StoreError};
use crate::auth::{ApiKey, KeyId, Role, RoleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Memory store that counts lookups and can stall them
#[derive(Default)]
pub(crate) struct StallingStore {
    pub(crate) inner: MemoryStore,
    pub(crate) lookups: AtomicUsize,
    pub(crate) lookup_delay: Option<Duration>,
}

#[async_trait]
impl CredentialStore for StallingStore {
    async fn create_role(&self, role: &Role) -> Result<Role, StoreError> {
        self.inner.create_role(role).await
    }
    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        self.inner.get_role(id).await
    }
    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        self.inner.get_role_by_name(name).await
    }
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.inner.list_roles().await
    }
    async fn update_role(&self, role: &Role) -> Result<(), StoreError> {
        self.inner.update_role(role).await
    }
    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        self.inner.delete_role(id).await
    }
    async fn create_api_key(&self, key: &ApiKey) -> Result<ApiKey, StoreError> {
        self.inner.create_api_key(key).await
    }
    async fn find_by_token(&self, token: &str) -> Result<Option<(ApiKey, Role)>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.find_by_token(token).await
    }
    async fn get_api_key(&self, id: KeyId) -> Result<Option<ApiKey>, StoreError> {
        self.inner.get_api_key(id).await
    }
    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, StoreError> {
        self.inner.list_api_keys().await
    }
    async fn update_expiry(
        &self,
        id: KeyId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.inner.update_expiry(id, expires_at).await
    }
    async fn update_last_used(&self, id: KeyId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.update_last_used(id, at).await
    }
    async fn count_by_role(&self, role_id: RoleId) -> Result<u64, StoreError> {
        self.inner.count_by_role(role_id).await
    }
    async fn delete_api_key(&self, id: KeyId) -> Result<(), StoreError> {
        self.inner.delete_api_key(id).await
    }
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
