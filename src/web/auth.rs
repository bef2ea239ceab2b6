//! Request authentication for the JSON API
//!
//! Two guards sit in front of the routes: the root key check for the
//! administrative lookups and the API key gate for role and key management.
//! A successful API key check leaves an [`AuthContext`] in the request
//! extensions for handlers to pick up with `Extension<AuthContext>`.

use super::api::error_response;
use super::server::AppState;
use crate::auth::{AuthContext, AuthError, AuthRequest};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Header carrying a regular API key
pub const API_KEY_HEADER: &str = "X-API-Key";
/// Header carrying the root API key
pub const ROOT_API_KEY_HEADER: &str = "X-Root-API-Key";

/// Remote address of the caller, when the server was started with
/// connect info
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAddr(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        ))
    }
}

/// State for the API key guard of one route group
#[derive(Clone)]
pub struct KeyGuard {
    pub app: AppState,
    /// Permission every route in the group needs
    pub permission: &'static str,
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// HTTP status for each authentication failure
pub fn auth_error_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::MissingCredential
        | AuthError::MalformedCredential
        | AuthError::AuthenticationFailed
        | AuthError::CredentialExpired => StatusCode::UNAUTHORIZED,
        AuthError::InsufficientPermission(_) => StatusCode::FORBIDDEN,
        AuthError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        AuthError::Cancelled => StatusCode::REQUEST_TIMEOUT,
    }
}

/// Convert an authentication failure into a JSON error response
pub fn auth_error_response(err: AuthError) -> Response {
    let mut response = error_response(auth_error_status(&err), err.code(), err.to_string());

    if let AuthError::Throttled { retry_after_secs } = err {
        if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }

    response
}

/// Authenticate the `X-API-Key` header and require the group permission
pub async fn require_api_key(
    State(guard): State<KeyGuard>,
    ClientAddr(client_addr): ClientAddr,
    mut request: Request,
    next: Next,
) -> Response {
    let auth = {
        let token = header_value(request.headers(), API_KEY_HEADER).map(str::to_owned);
        let auth_request = AuthRequest::new(token.as_deref())
            .require(guard.permission)
            .from_addr(client_addr);

        guard
            .app
            .gate
            .authenticate_with_cancel(auth_request, &guard.app.shutdown)
            .await
    };

    match auth {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => auth_error_response(e),
    }
}

/// Require the root key in `X-Root-API-Key`
pub async fn require_root_key(
    State(state): State<AppState>,
    ClientAddr(client_addr): ClientAddr,
    request: Request,
    next: Next,
) -> Response {
    if let Some(addr) = client_addr {
        if let Err(retry_after_secs) = state.tracker.check(&addr) {
            return auth_error_response(AuthError::Throttled { retry_after_secs });
        }
    }

    let presented = header_value(request.headers(), ROOT_API_KEY_HEADER).unwrap_or_default();
    if presented.is_empty() {
        if let Some(addr) = client_addr {
            state.tracker.record_failure(&addr);
        }
        return error_response(
            StatusCode::UNAUTHORIZED,
            "missing_root_api_key",
            "Root API key is required for admin operations",
        );
    }

    if !state.root.verify(presented) {
        if let Some(addr) = client_addr {
            state.tracker.record_failure(&addr);
        }
        tracing::debug!(client = ?client_addr, "Rejected root API key");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_root_api_key",
            "Invalid root API key",
        );
    }

    if let Some(addr) = client_addr {
        state.tracker.clear(&addr);
    }
    next.run(request).await
}

/// Require an additional permission inside a guarded group
pub fn require_permission(auth: &AuthContext, permission: &str) -> Result<(), Response> {
    auth.require_permission(permission)
        .map_err(auth_error_response)
}
