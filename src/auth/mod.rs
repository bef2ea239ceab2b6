//! Authentication and authorization for OrbitKeys
//!
//! Provides role-based access control for API keys:
//! - Generate and validate opaque `orbitkey_` tokens
//! - Bind each key to a role carrying `resource:action` permissions
//! - Authenticate requests with a time budget, cancellation and throttling
//! - Compare the root key in constant time
//! - Optional key expiration

mod gate;
mod key;
mod lifecycle;
mod manager;
mod permissions;
mod root;
mod throttle;
mod types;
mod usage;

pub use gate::{
    extract_api_key, AuthContext, AuthError, AuthGate, AuthRequest, DEFAULT_AUTH_TIMEOUT,
};
pub use key::{
    generate_api_key, generate_api_key_with, validate_api_key, KeyError, DEFAULT_KEY_LENGTH,
    KEY_PREFIX, MIN_KEY_LENGTH, MIN_TRIMMED_KEY_LENGTH,
};
pub use lifecycle::{issue_api_key, ExpirationUpdate, IssueError, MAX_KEY_LIFETIME};
pub use manager::{AuthManager, AuthManagerError, RoleUpdate};
pub use permissions::{
    check_permission, format_permission, parse_permissions, validate_permission_format,
    PERMISSION_SEPARATOR, WILDCARD_PERMISSION,
};
pub use root::{is_root_api_key, RootKeyGate};
pub use throttle::{
    FailedAttemptTracker, ThrottleSettings, DEFAULT_FAILURE_WINDOW, DEFAULT_LOCKOUT,
    DEFAULT_MAX_FAILED_ATTEMPTS,
};
pub use types::{admin_role, ApiKey, ApiKeyMetadata, KeyId, Role, RoleId, ROLE_ADMIN};
pub use usage::{ErrorSink, LastUsedRecorder, TracingErrorSink};
