//! JSON API for OrbitKeys
//!
//! Provides the HTTP surface over the auth core:
//! - Health check
//! - Root-protected key lookup and permission validation
//! - Role and API key management behind the API key guard

mod api;
mod auth;
mod server;

pub use api::{
    CreateApiKeyRequest, CreateRoleRequest, HealthResponse, LookupResponse,
    UpdateExpirationRequest, UpdateRoleRequest, ValidateResponse,
};
pub use auth::{
    auth_error_response, auth_error_status, ClientAddr, API_KEY_HEADER, ROOT_API_KEY_HEADER,
};
pub use server::{build_router, AppState, WebServer};
