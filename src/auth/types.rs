//! Role and API key records
//!
//! Provides:
//! - Role: a named, ordered list of permission strings
//! - ApiKey: a bearer token bound to exactly one role
//! - ApiKeyMetadata: display-safe view of a key

use super::permissions::{check_permission, validate_permission_format, WILDCARD_PERMISSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate role identifier (0 means "not yet stored")
pub type RoleId = u64;

/// Surrogate API key identifier (0 means "not yet stored")
pub type KeyId = u64;

/// Name of the role created on first start
pub const ROLE_ADMIN: &str = "admin";

/// A role that bundles permissions for one or more API keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Assigned by the store on creation
    pub id: RoleId,
    /// Unique, non-empty name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Permission strings, in the order they were granted
    #[serde(default)]
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Create an unsaved role; invalid or duplicate permissions are dropped
    pub fn new<I, S>(name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        let mut role = Self {
            id: 0,
            name: name.into(),
            description: None,
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        for permission in permissions {
            role.add_permission(permission);
        }
        role
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Permissions granted by this role
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// Check a required permission against this role's grants
    pub fn has_permission(&self, permission: &str) -> bool {
        check_permission(permission, &self.permissions)
    }

    /// Grant a permission
    ///
    /// Returns false (and leaves the role unchanged) if the permission is
    /// malformed or already granted.
    pub fn add_permission(&mut self, permission: impl Into<String>) -> bool {
        let permission = permission.into();
        if !validate_permission_format(&permission) || self.permissions.contains(&permission) {
            return false;
        }
        self.permissions.push(permission);
        self.updated_at = Utc::now();
        true
    }

    /// Remove a permission; returns false if it was not granted
    pub fn remove_permission(&mut self, permission: &str) -> bool {
        let before = self.permissions.len();
        self.permissions.retain(|p| p != permission);
        let removed = self.permissions.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }
}

/// An API key bound to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Assigned by the store on creation
    pub id: KeyId,
    /// The bearer secret, globally unique
    pub key: String,
    pub role_id: RoleId,
    #[serde(default)]
    pub description: String,
    /// Caller-defined metadata, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// None means the key never expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Whether the key had expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => expires < now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn touch_last_used(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(now);
    }

    /// First characters of the key, safe to show in listings
    pub fn display_key(&self) -> String {
        let visible: String = self.key.chars().take(super::key::KEY_PREFIX.len() + 6).collect();
        format!("{}...", visible)
    }
}

/// Metadata for an API key (safe for display, excludes the secret)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyMetadata {
    pub id: KeyId,
    pub key_preview: String,
    pub role_id: RoleId,
    pub description: String,
    pub custom_data: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&ApiKey> for ApiKeyMetadata {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id,
            key_preview: key.display_key(),
            role_id: key.role_id,
            description: key.description.clone(),
            custom_data: key.custom_data.clone(),
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
        }
    }
}

/// The role created when the store has none named [`ROLE_ADMIN`]
pub fn admin_role() -> Role {
    Role::new(ROLE_ADMIN, [WILDCARD_PERMISSION])
        .with_description("Administrator role with full access")
}
