//! OrbitKeys - API key issuance and role-based permission checks
//!
//! OrbitKeys issues opaque `orbitkey_` bearer tokens, binds each one to a
//! role carrying `resource:action` permissions, and answers "may this key
//! do that?" for the services sitting behind it.

pub mod auth;
pub mod config;
pub mod storage;
pub mod web;

use thiserror::Error;

pub use auth::{
    ApiKey, ApiKeyMetadata, AuthContext, AuthError, AuthGate, AuthManager, AuthManagerError,
    AuthRequest, KeyError, Role,
};
pub use config::{Config, ConfigError};
pub use storage::{open_store, CredentialStore, FileStore, MemoryStore, StoreError};

/// Core error types for OrbitKeys
#[derive(Error, Debug)]
pub enum OrbitKeysError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Key generation error: {0}")]
    Key(#[from] KeyError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Manager(#[from] AuthManagerError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
