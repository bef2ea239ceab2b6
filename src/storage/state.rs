//! Indexed in-memory state shared by the memory and file backends

use super::StoreError;
use crate::auth::{ApiKey, KeyId, Role, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct StoreState {
    #[serde(default)]
    last_role_id: RoleId,
    #[serde(default)]
    last_key_id: KeyId,
    #[serde(default)]
    roles: BTreeMap<RoleId, Role>,
    #[serde(default)]
    api_keys: BTreeMap<KeyId, ApiKey>,

    // Secondary indexes (not serialized, rebuilt on load)
    /// Index: role name -> role ID
    #[serde(skip)]
    role_name_index: HashMap<String, RoleId>,
    /// Index: token -> API key ID
    #[serde(skip)]
    token_index: HashMap<String, KeyId>,
}

impl StoreState {
    /// Rebuild all secondary indexes from primary data
    pub(super) fn rebuild_indexes(&mut self) {
        self.role_name_index = self
            .roles
            .values()
            .map(|role| (role.name.clone(), role.id))
            .collect();
        self.token_index = self
            .api_keys
            .values()
            .map(|key| (key.key.clone(), key.id))
            .collect();
    }

    pub(super) fn create_role(&mut self, role: &Role) -> Result<Role, StoreError> {
        if self.role_name_index.contains_key(&role.name) {
            return Err(StoreError::Conflict(format!(
                "role name already exists: {}",
                role.name
            )));
        }

        self.last_role_id += 1;
        let mut stored = role.clone();
        stored.id = self.last_role_id;

        self.role_name_index.insert(stored.name.clone(), stored.id);
        self.roles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    pub(super) fn get_role(&self, id: RoleId) -> Option<Role> {
        self.roles.get(&id).cloned()
    }

    pub(super) fn get_role_by_name(&self, name: &str) -> Option<Role> {
        self.role_name_index
            .get(name)
            .and_then(|id| self.roles.get(id))
            .cloned()
    }

    pub(super) fn list_roles(&self) -> Vec<Role> {
        self.roles.values().cloned().collect()
    }

    pub(super) fn update_role(&mut self, role: &Role) -> Result<(), StoreError> {
        let old_name = self
            .roles
            .get(&role.id)
            .map(|r| r.name.clone())
            .ok_or(StoreError::RoleNotFound(role.id))?;

        if let Some(existing) = self.role_name_index.get(&role.name) {
            if *existing != role.id {
                return Err(StoreError::Conflict(format!(
                    "role name already exists: {}",
                    role.name
                )));
            }
        }

        if old_name != role.name {
            self.role_name_index.remove(&old_name);
            self.role_name_index.insert(role.name.clone(), role.id);
        }
        self.roles.insert(role.id, role.clone());
        Ok(())
    }

    pub(super) fn delete_role(&mut self, id: RoleId) -> Result<(), StoreError> {
        let role = self.roles.remove(&id).ok_or(StoreError::RoleNotFound(id))?;
        self.role_name_index.remove(&role.name);
        Ok(())
    }

    pub(super) fn create_api_key(&mut self, key: &ApiKey) -> Result<ApiKey, StoreError> {
        if self.token_index.contains_key(&key.key) {
            return Err(StoreError::Conflict("API key token already exists".to_string()));
        }

        self.last_key_id += 1;
        let mut stored = key.clone();
        stored.id = self.last_key_id;

        self.token_index.insert(stored.key.clone(), stored.id);
        self.api_keys.insert(stored.id, stored.clone());
        Ok(stored)
    }

    pub(super) fn find_by_token(&self, token: &str) -> Option<(ApiKey, Role)> {
        let key = self.token_index.get(token).and_then(|id| self.api_keys.get(id))?;
        let role = self.roles.get(&key.role_id)?;
        Some((key.clone(), role.clone()))
    }

    pub(super) fn get_api_key(&self, id: KeyId) -> Option<ApiKey> {
        self.api_keys.get(&id).cloned()
    }

    pub(super) fn list_api_keys(&self) -> Vec<ApiKey> {
        self.api_keys.values().cloned().collect()
    }

    pub(super) fn update_expiry(
        &mut self,
        id: KeyId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let key = self
            .api_keys
            .get_mut(&id)
            .ok_or(StoreError::ApiKeyNotFound(id))?;
        key.expires_at = expires_at;
        Ok(())
    }

    pub(super) fn update_last_used(&mut self, id: KeyId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = self
            .api_keys
            .get_mut(&id)
            .ok_or(StoreError::ApiKeyNotFound(id))?;
        key.touch_last_used(at);
        Ok(())
    }

    pub(super) fn count_by_role(&self, role_id: RoleId) -> u64 {
        self.api_keys
            .values()
            .filter(|key| key.role_id == role_id)
            .count() as u64
    }

    pub(super) fn delete_api_key(&mut self, id: KeyId) -> Result<(), StoreError> {
        let key = self.api_keys.remove(&id).ok_or(StoreError::ApiKeyNotFound(id))?;
        self.token_index.remove(&key.key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_for(role_id: RoleId, token: &str) -> ApiKey {
        ApiKey {
            id: 0,
            key: token.to_string(),
            role_id,
            description: String::new(),
            custom_data: None,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_ids_are_assigned_sequentially() {
        let mut state = StoreState::default();
        let a = state.create_role(&Role::new("a", ["x:y"])).unwrap();
        let b = state.create_role(&Role::new("b", ["x:y"])).unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        // Ids are not reused after deletion
        state.delete_role(b.id).unwrap();
        let c = state.create_role(&Role::new("c", ["x:y"])).unwrap();
        assert_eq!(c.id, 3);
    }

    #[test]
    fn test_rename_role_updates_index() {
        let mut state = StoreState::default();
        let mut role = state.create_role(&Role::new("before", ["x:y"])).unwrap();
        role.name = "after".to_string();
        state.update_role(&role).unwrap();

        assert!(state.get_role_by_name("before").is_none());
        assert_eq!(state.get_role_by_name("after").unwrap().id, role.id);
    }

    #[test]
    fn test_rename_into_existing_name_conflicts() {
        let mut state = StoreState::default();
        state.create_role(&Role::new("taken", ["x:y"])).unwrap();
        let mut role = state.create_role(&Role::new("free", ["x:y"])).unwrap();
        role.name = "taken".to_string();
        assert!(matches!(state.update_role(&role), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_indexes_survive_serialization() {
        let mut state = StoreState::default();
        let role = state.create_role(&Role::new("svc", ["orders:read"])).unwrap();
        state.create_api_key(&key_for(role.id, "orbitkey_token")).unwrap();

        let json = serde_json::to_vec(&state).unwrap();
        let mut loaded: StoreState = serde_json::from_slice(&json).unwrap();
        assert!(loaded.find_by_token("orbitkey_token").is_none());

        loaded.rebuild_indexes();
        let (key, found_role) = loaded.find_by_token("orbitkey_token").unwrap();
        assert_eq!(key.role_id, role.id);
        assert_eq!(found_role.name, "svc");
        assert!(loaded.get_role_by_name("svc").is_some());

        // Counters continue after reload
        let next = loaded.create_role(&Role::new("next", ["x:y"])).unwrap();
        assert_eq!(next.id, role.id + 1);
    }
}
