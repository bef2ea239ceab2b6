//! JSON API handlers
//!
//! Role and key management sit behind the API key guard; lookup and
//! validate sit behind the root key guard.

use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::auth::{
    ApiKey, ApiKeyMetadata, AuthContext, AuthManagerError, ExpirationUpdate, KeyId, Role,
    RoleId, RoleUpdate, MAX_KEY_LIFETIME,
};

use super::auth::require_permission;
use super::server::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
    code: String,
}

impl ApiError {
    fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            error: error.into(),
        }
    }
}

pub(super) fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ApiError::new(code, message))).into_response()
}

fn manager_error_response(err: AuthManagerError) -> Response {
    let (status, code) = match &err {
        AuthManagerError::RoleNotFound(_) => (StatusCode::NOT_FOUND, "role_not_found"),
        AuthManagerError::KeyNotFound(_) => (StatusCode::NOT_FOUND, "api_key_not_found"),
        AuthManagerError::InvalidKey => (StatusCode::NOT_FOUND, "api_key_not_found"),
        AuthManagerError::KeyExpired => (StatusCode::UNAUTHORIZED, "api_key_expired"),
        AuthManagerError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "lookup_timeout"),
        AuthManagerError::Cancelled => (StatusCode::REQUEST_TIMEOUT, "lookup_cancelled"),
        AuthManagerError::RoleAlreadyExists(_) => (StatusCode::CONFLICT, "role_exists"),
        AuthManagerError::RoleInUse { .. } => (StatusCode::CONFLICT, "role_in_use"),
        AuthManagerError::InvalidRoleName => (StatusCode::BAD_REQUEST, "invalid_role_name"),
        AuthManagerError::InvalidPermission(_) => (StatusCode::BAD_REQUEST, "invalid_permission"),
        AuthManagerError::InvalidRoleReference(_) => {
            (StatusCode::BAD_REQUEST, "invalid_role_reference")
        }
        AuthManagerError::GenerationFailure(_) | AuthManagerError::Storage(_) => {
            tracing::error!(error = %err, "Request failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            );
        }
    };

    let message = match &err {
        AuthManagerError::InvalidKey => "API key not found".to_string(),
        other => other.to_string(),
    };
    error_response(status, code, message)
}

/// Days from now as a lifetime; non-positive means none
fn ttl_from_days(days: Option<i64>) -> Option<Duration> {
    days.filter(|d| *d > 0)
        .map(|d| Duration::try_days(d).unwrap_or(MAX_KEY_LIFETIME))
}

// ============== Health Check ==============

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint (no auth required)
pub async fn api_health(State(state): State<AppState>) -> Response {
    let (status, label) = match state.manager.store().health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
        .into_response()
}

// ============== Root-protected lookups ==============

#[derive(Deserialize)]
pub struct LookupQuery {
    #[serde(default)]
    pub key: String,
}

#[derive(Serialize, Deserialize)]
pub struct LookupResponse {
    pub api_key: ApiKey,
    pub role: Role,
}

/// Find a key and its role by token
pub async fn api_lookup(State(state): State<AppState>, Query(query): Query<LookupQuery>) -> Response {
    if query.key.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "missing_parameter",
            "Key parameter is required",
        );
    }

    match state
        .manager
        .lookup_api_key_with_cancel(&query.key, &state.shutdown)
        .await
    {
        Ok((api_key, role)) => Json(LookupResponse { api_key, role }).into_response(),
        Err(e) => manager_error_response(e),
    }
}

#[derive(Deserialize)]
pub struct ValidateQuery {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub permission: String,
}

#[derive(Serialize, Deserialize)]
pub struct ValidateResponse {
    pub has_permission: bool,
}

/// Check whether a key grants a permission
pub async fn api_validate(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Response {
    if query.key.is_empty() || query.permission.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "missing_parameter",
            "Key and permission parameters are required",
        );
    }

    match state
        .manager
        .check_api_key_permission_with_cancel(&query.key, &query.permission, &state.shutdown)
        .await
    {
        Ok(has_permission) => Json(ValidateResponse { has_permission }).into_response(),
        Err(e) => manager_error_response(e),
    }
}

// ============== Roles ==============

#[derive(Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

pub async fn api_list_roles(State(state): State<AppState>) -> Response {
    match state.manager.list_roles().await {
        Ok(roles) => Json(roles).into_response(),
        Err(e) => manager_error_response(e),
    }
}

pub async fn api_get_role(State(state): State<AppState>, Path(id): Path<RoleId>) -> Response {
    match state.manager.get_role(id).await {
        Ok(role) => Json(role).into_response(),
        Err(e) => manager_error_response(e),
    }
}

pub async fn api_create_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateRoleRequest>,
) -> Response {
    if let Err(denied) = require_permission(&auth, "roles:create") {
        return denied;
    }

    match state
        .manager
        .create_role(request.name, request.permissions, request.description)
        .await
    {
        Ok(role) => (StatusCode::CREATED, Json(role)).into_response(),
        Err(e) => manager_error_response(e),
    }
}

pub async fn api_update_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<RoleId>,
    Json(request): Json<UpdateRoleRequest>,
) -> Response {
    if let Err(denied) = require_permission(&auth, "roles:update") {
        return denied;
    }

    let update = RoleUpdate {
        name: request.name,
        description: request.description,
        permissions: request.permissions,
    };

    match state.manager.update_role(id, update).await {
        Ok(role) => Json(role).into_response(),
        Err(e) => manager_error_response(e),
    }
}

pub async fn api_delete_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<RoleId>,
) -> Response {
    if let Err(denied) = require_permission(&auth, "roles:delete") {
        return denied;
    }

    match state.manager.delete_role(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => manager_error_response(e),
    }
}

// ============== API keys ==============

#[derive(Deserialize)]
pub struct CreateApiKeyRequest {
    pub role_id: RoleId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub custom_data: Option<String>,
    /// Lifetime in days; absent or non-positive means no expiry
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateExpirationRequest {
    /// Days from now; absent removes the expiry, negative expires now
    #[serde(default)]
    pub expires_in: Option<i64>,
}

pub async fn api_list_keys(State(state): State<AppState>) -> Response {
    match state.manager.list_api_keys().await {
        Ok(keys) => {
            let keys: Vec<ApiKeyMetadata> = keys.iter().map(ApiKeyMetadata::from).collect();
            Json(keys).into_response()
        }
        Err(e) => manager_error_response(e),
    }
}

pub async fn api_get_key(State(state): State<AppState>, Path(id): Path<KeyId>) -> Response {
    match state.manager.get_api_key(id).await {
        Ok(key) => Json(ApiKeyMetadata::from(&key)).into_response(),
        Err(e) => manager_error_response(e),
    }
}

/// Issue a key; the response is the only time the full token is returned
pub async fn api_create_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Response {
    if let Err(denied) = require_permission(&auth, "keys:create") {
        return denied;
    }

    match state
        .manager
        .create_api_key(
            request.role_id,
            request.description,
            request.custom_data,
            ttl_from_days(request.expires_in),
        )
        .await
    {
        Ok(key) => (StatusCode::CREATED, Json(key)).into_response(),
        Err(e) => manager_error_response(e),
    }
}

pub async fn api_update_key_expiration(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<KeyId>,
    Json(request): Json<UpdateExpirationRequest>,
) -> Response {
    if let Err(denied) = require_permission(&auth, "keys:update") {
        return denied;
    }

    let update = ExpirationUpdate::from_days(request.expires_in);
    match state.manager.update_api_key_expiration(id, update).await {
        Ok(key) => Json(ApiKeyMetadata::from(&key)).into_response(),
        Err(e) => manager_error_response(e),
    }
}

pub async fn api_delete_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<KeyId>,
) -> Response {
    if let Err(denied) = require_permission(&auth, "keys:delete") {
        return denied;
    }

    match state.manager.revoke_api_key(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => manager_error_response(e),
    }
}
