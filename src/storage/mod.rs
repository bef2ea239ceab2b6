//! Storage backends for roles and API keys
//!
//! The core only talks to [`CredentialStore`]; any durable key/value or
//! relational store can sit behind it. Stores assign surrogate ids and
//! enforce token and role-name uniqueness.

mod file;
mod memory;
mod state;
#[cfg(test)]
pub(crate) mod testing;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::auth::{ApiKey, KeyId, Role, RoleId};
use crate::config::{StorageBackendType, StorageConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Storage-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("API key not found: {0}")]
    ApiKeyNotFound(KeyId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Persistence contract required by the auth core
#[async_trait]
pub trait CredentialStore: Send + Sync {
    // ==================== Roles ====================

    /// Store a new role and return it with its assigned id
    async fn create_role(&self, role: &Role) -> Result<Role, StoreError>;

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>, StoreError>;

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    /// Replace an existing role (matched by id)
    async fn update_role(&self, role: &Role) -> Result<(), StoreError>;

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError>;

    // ==================== API keys ====================

    /// Store a new key and return it with its assigned id
    async fn create_api_key(&self, key: &ApiKey) -> Result<ApiKey, StoreError>;

    /// Exact token lookup, returning the key together with its role
    async fn find_by_token(&self, token: &str) -> Result<Option<(ApiKey, Role)>, StoreError>;

    async fn get_api_key(&self, id: KeyId) -> Result<Option<ApiKey>, StoreError>;

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, StoreError>;

    /// Set or clear a key's expiry
    async fn update_expiry(
        &self,
        id: KeyId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn update_last_used(&self, id: KeyId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Number of keys referencing `role_id`
    async fn count_by_role(&self, role_id: RoleId) -> Result<u64, StoreError>;

    async fn delete_api_key(&self, id: KeyId) -> Result<(), StoreError>;

    /// Check if the backend is available and healthy
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Open the backend selected in `config`
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn CredentialStore>, StoreError> {
    match config.backend {
        StorageBackendType::File => {
            let store = FileStore::open(&config.path).await?;
            tracing::debug!(path = %config.path.display(), "Opened file store");
            Ok(Arc::new(store))
        }
        StorageBackendType::Memory => {
            tracing::warn!("Using in-memory storage; roles and keys are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_store_per_backend() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let file = open_store(&StorageConfig {
            backend: StorageBackendType::File,
            path: path.clone(),
        })
        .await
        .unwrap();
        file.health_check().await.unwrap();
        assert!(path.exists());

        let memory = open_store(&StorageConfig {
            backend: StorageBackendType::Memory,
            path: dir.path().join("unused.json"),
        })
        .await
        .unwrap();
        assert!(memory.list_roles().await.unwrap().is_empty());
        assert!(!dir.path().join("unused.json").exists());
    }
}
