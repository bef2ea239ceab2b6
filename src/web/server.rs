//! Web server implementation using Axum

use crate::auth::{AuthGate, AuthManager, FailedAttemptTracker, RootKeyGate};
use crate::config::Config;
use crate::storage::CredentialStore;
use axum::{
    extract::FromRef,
    middleware,
    routing::{get, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::api;
use super::auth::{require_api_key, require_root_key, KeyGuard};

/// How often stale failed-attempt entries are dropped
const TRACKER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: AuthManager,
    pub gate: AuthGate,
    pub root: RootKeyGate,
    pub tracker: Arc<FailedAttemptTracker>,
    /// Fires on shutdown; in-flight authentications give up when it does
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the auth components around `store` using `config`
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Self {
        let tracker = Arc::new(FailedAttemptTracker::new(config.auth.throttle));
        let gate = AuthGate::new(Arc::clone(&store))
            .with_timeout(config.auth.request_timeout)
            .with_tracker(Arc::clone(&tracker));

        Self {
            manager: AuthManager::new(store).with_lookup_timeout(config.auth.request_timeout),
            gate,
            root: RootKeyGate::new(config.root_api_key.clone()),
            tracker,
            shutdown: CancellationToken::new(),
        }
    }
}

impl FromRef<AppState> for AuthManager {
    fn from_ref(state: &AppState) -> Self {
        state.manager.clone()
    }
}

impl FromRef<AppState> for Arc<FailedAttemptTracker> {
    fn from_ref(state: &AppState) -> Self {
        state.tracker.clone()
    }
}

/// Build the API router, nested under `base_url`
pub fn build_router(state: AppState, base_url: &str) -> Router {
    let key_guard = |permission: &'static str| KeyGuard {
        app: state.clone(),
        permission,
    };

    let admin = Router::new()
        .route("/lookup", get(api::api_lookup))
        .route("/validate", get(api::api_validate))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_root_key));

    let roles = Router::new()
        .route("/", get(api::api_list_roles).post(api::api_create_role))
        .route(
            "/{id}",
            get(api::api_get_role)
                .put(api::api_update_role)
                .delete(api::api_delete_role),
        )
        .route_layer(middleware::from_fn_with_state(
            key_guard("roles:read"),
            require_api_key,
        ));

    let keys = Router::new()
        .route("/", get(api::api_list_keys).post(api::api_create_key))
        .route("/{id}", get(api::api_get_key).delete(api::api_delete_key))
        .route("/{id}/expiration", put(api::api_update_key_expiration))
        .route_layer(middleware::from_fn_with_state(
            key_guard("keys:read"),
            require_api_key,
        ));

    let api = Router::new()
        .route("/health", get(api::api_health))
        .merge(admin)
        .nest("/roles", roles)
        .nest("/keys", keys);

    Router::new()
        .nest(base_url, api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for the OrbitKeys API
pub struct WebServer {
    bind: String,
    base_url: String,
    state: AppState,
}

impl WebServer {
    /// Create a new web server
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            bind: config.server.bind.clone(),
            base_url: config.base_url.clone(),
            state: AppState::new(config, store),
        }
    }

    /// Override the bind address
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until the shutdown token fires
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let router = build_router(self.state.clone(), &self.base_url);
        let listener = tokio::net::TcpListener::bind(&self.bind).await?;

        let shutdown = self.state.shutdown.clone();
        let tracker = Arc::clone(&self.state.tracker);
        let cleanup_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TRACKER_CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = cleanup_shutdown.cancelled() => break,
                    _ = interval.tick() => tracker.cleanup(),
                }
            }
        });

        tracing::info!(bind = %self.bind, base_url = %self.base_url, "Starting OrbitKeys API");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

        tracing::info!("OrbitKeys API stopped");
        Ok(())
    }

    /// Get the bind address
    pub fn bind_address(&self) -> &str {
        &self.bind
    }
}
