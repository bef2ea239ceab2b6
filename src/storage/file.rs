//! JSON file storage backend
//!
//! Keeps all roles and keys in memory and rewrites the file after every
//! mutation. Writes go to a temporary file that is then renamed into place.

use super::state::StoreState;
use super::{CredentialStore, StoreError};
use crate::auth::{ApiKey, KeyId, Role, RoleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Current on-disk format version
const FILE_VERSION: u32 = 1;

/// File-backed store
pub struct FileStore {
    /// Path to the storage file
    path: PathBuf,
    /// In-memory copy of the file contents
    state: RwLock<StoreState>,
    /// Serializes writers so saves land in mutation order
    write_lock: Mutex<()>,
}

/// On-disk format for the storage file
#[derive(Debug, Serialize, Deserialize)]
struct StorageFile {
    /// Version for future migrations
    version: u32,
    #[serde(flatten)]
    state: StoreState,
}

impl FileStore {
    /// Open the store at `path`, creating an empty file if none exists
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let state = if fs::try_exists(&path).await? {
            Self::read_state(&path).await?
        } else {
            StoreState::default()
        };

        let store = Self {
            path,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        };

        // Make sure the file exists from the first open
        store.save().await?;

        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload data from disk (for picking up external changes)
    pub async fn reload(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let state = Self::read_state(&self.path).await?;
        *self.state.write() = state;
        Ok(())
    }

    async fn read_state(path: &Path) -> Result<StoreState, StoreError> {
        let content = fs::read(path).await?;
        let file: StorageFile = serde_json::from_slice(&content)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if file.version > FILE_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported storage file version {}",
                file.version
            )));
        }

        let mut state = file.state;
        state.rebuild_indexes();
        Ok(state)
    }

    /// Save the current state to disk
    async fn save(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.state.read().clone();
        self.persist(&snapshot).await
    }

    /// Write `state` to a temporary file and rename it over the store file
    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(&StorageFileRef {
            version: FILE_VERSION,
            state,
        })
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &content).await?;
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Apply a mutation to a copy of the state, persist the copy, then
    /// make it live
    ///
    /// A failed save leaves the in-memory state untouched.
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.state.read().clone();
        let result = op(&mut next)?;

        self.persist(&next).await?;
        *self.state.write() = next;
        Ok(result)
    }
}

/// Borrowing twin of [`StorageFile`] used when saving
#[derive(Serialize)]
struct StorageFileRef<'a> {
    version: u32,
    #[serde(flatten)]
    state: &'a StoreState,
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn create_role(&self, role: &Role) -> Result<Role, StoreError> {
        self.mutate(|state| state.create_role(role)).await
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
        self.mutate(|state| state.update_role(role)).await
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        self.mutate(|state| state.delete_role(id)).await
    }

    async fn create_api_key(&self, key: &ApiKey) -> Result<ApiKey, StoreError> {
        self.mutate(|state| state.create_api_key(key)).await
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
        self.mutate(|state| state.update_expiry(id, expires_at)).await
    }

    async fn update_last_used(&self, id: KeyId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(|state| state.update_last_used(id, at)).await
    }

    async fn count_by_role(&self, role_id: RoleId) -> Result<u64, StoreError> {
        Ok(self.state.read().count_by_role(role_id))
    }

    async fn delete_api_key(&self, id: KeyId) -> Result<(), StoreError> {
        self.mutate(|state| state.delete_api_key(id)).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if !fs::try_exists(&self.path).await? {
            return Err(StoreError::Unavailable(
                "Storage file does not exist".to_string(),
            ));
        }

        fs::metadata(&self.path).await?;
        Ok(())
    }
}
