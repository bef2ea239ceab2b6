//! Integration tests for the authentication system
//!
//! Tests the full flow: storage -> auth manager -> authentication gate

use chrono::{Duration, Utc};
use orbitkeys::auth::{
    generate_api_key, is_root_api_key, validate_api_key, AuthError, AuthGate, AuthManager,
    AuthManagerError, AuthRequest, ExpirationUpdate, FailedAttemptTracker, RoleUpdate,
    ThrottleSettings, KEY_PREFIX, MAX_KEY_LIFETIME, ROLE_ADMIN,
};
use orbitkeys::storage::{CredentialStore, FileStore, MemoryStore};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tempfile::tempdir;

fn memory_store() -> Arc<dyn CredentialStore> {
    Arc::new(MemoryStore::new())
}

/// Issue, authorize, deny, expire and reject a malformed token
#[tokio::test]
async fn test_end_to_end_authentication() {
    let store = memory_store();
    let manager = AuthManager::new(store.clone());
    let gate = AuthGate::new(store.clone());

    let role = manager
        .create_role("orders-reader", vec!["orders:read".to_string()], None)
        .await
        .unwrap();
    let key = manager
        .create_api_key(role.id, "order service", None, None)
        .await
        .unwrap();

    let ctx = gate
        .authenticate(AuthRequest::new(Some(key.key.as_str())).require("orders:read"))
        .await
        .unwrap();
    assert_eq!(ctx.api_key.id, key.id);
    assert_eq!(ctx.role.name, "orders-reader");

    let denied = gate
        .authenticate(AuthRequest::new(Some(key.key.as_str())).require("orders:write"))
        .await;
    assert!(matches!(denied, Err(AuthError::InsufficientPermission(p)) if p == "orders:write"));

    store
        .update_expiry(key.id, Some(Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();
    let expired = gate
        .authenticate(AuthRequest::new(Some(key.key.as_str())).require("orders:read"))
        .await;
    assert!(matches!(expired, Err(AuthError::CredentialExpired)));

    let malformed = gate
        .authenticate(AuthRequest::new(Some("not-a-key")).require("orders:read"))
        .await;
    assert!(matches!(malformed, Err(AuthError::MalformedCredential)));
}

/// Unknown but well-formed tokens fail the same way as malformed ones
#[tokio::test]
async fn test_unknown_token_is_generic_failure() {
    let gate = AuthGate::new(memory_store());
    let token = generate_api_key(32).unwrap();

    let err = gate.authenticate(AuthRequest::new(Some(token.as_str()))).await.unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed));
    assert_eq!(err.to_string(), AuthError::MalformedCredential.to_string());
    assert_eq!(err.code(), AuthError::MalformedCredential.code());
}

#[tokio::test]
async fn test_missing_token() {
    let gate = AuthGate::new(memory_store());
    let err = gate.authenticate(AuthRequest::new(None)).await.unwrap_err();
    assert!(matches!(err, AuthError::MissingCredential));
}

/// The admin wildcard role grants everything
#[tokio::test]
async fn test_admin_role_wildcard() {
    let store = memory_store();
    let manager = AuthManager::new(store.clone());
    let admin = manager.ensure_default_admin_role().await.unwrap();
    assert_eq!(admin.name, ROLE_ADMIN);

    // Idempotent
    let again = manager.ensure_default_admin_role().await.unwrap();
    assert_eq!(again.id, admin.id);
    assert_eq!(manager.list_roles().await.unwrap().len(), 1);

    let key = manager.create_api_key(admin.id, "", None, None).await.unwrap();
    let gate = AuthGate::new(store);
    for permission in ["roles:delete", "keys:create", "anything:else"] {
        gate.authenticate(AuthRequest::new(Some(key.key.as_str())).require(permission))
            .await
            .unwrap();
    }
}

/// Resource wildcards cover every action on that resource only
#[tokio::test]
async fn test_resource_wildcard_and_malformed_requirement() {
    let store = memory_store();
    let manager = AuthManager::new(store.clone());
    let role = manager
        .create_role("users-admin", vec!["users:*".to_string()], None)
        .await
        .unwrap();
    let key = manager.create_api_key(role.id, "", None, None).await.unwrap();
    let gate = AuthGate::new(store);

    assert!(gate
        .authenticate(AuthRequest::new(Some(key.key.as_str())).require("users:write"))
        .await
        .is_ok());
    assert!(matches!(
        gate.authenticate(AuthRequest::new(Some(key.key.as_str())).require("orders:read"))
            .await,
        Err(AuthError::InsufficientPermission(_))
    ));
    assert!(matches!(
        gate.authenticate(AuthRequest::new(Some(key.key.as_str())).require("users:read:extra"))
            .await,
        Err(AuthError::InsufficientPermission(_))
    ));
}

/// Role updates take effect on the next authentication
#[tokio::test]
async fn test_permission_changes_apply_immediately() {
    let store = memory_store();
    let manager = AuthManager::new(store.clone());
    let gate = AuthGate::new(store);

    let role = manager
        .create_role("reporting", vec!["reports:read".to_string()], None)
        .await
        .unwrap();
    let key = manager.create_api_key(role.id, "", None, None).await.unwrap();

    let request = || AuthRequest::new(Some(key.key.as_str())).require("reports:export");
    assert!(gate.authenticate(request()).await.is_err());

    manager.grant_permission(role.id, "reports:export").await.unwrap();
    assert!(gate.authenticate(request()).await.is_ok());

    manager
        .update_role(
            role.id,
            RoleUpdate {
                permissions: Some(vec!["reports:read".to_string()]),
                ..RoleUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(gate.authenticate(request()).await.is_err());
}

/// Issuance rejects missing roles and caps lifetimes
#[tokio::test]
async fn test_issuance_rules() {
    let manager = AuthManager::new(memory_store());

    assert!(matches!(
        manager.create_api_key(0, "", None, None).await,
        Err(AuthManagerError::InvalidRoleReference(0))
    ));
    assert!(matches!(
        manager.create_api_key(42, "", None, None).await,
        Err(AuthManagerError::InvalidRoleReference(42))
    ));

    let role = manager.create_role("svc", vec![], None).await.unwrap();
    let before = Utc::now();
    let key = manager
        .create_api_key(role.id, "", None, Some(Duration::days(11 * 365)))
        .await
        .unwrap();
    let expires_at = key.expires_at.unwrap();
    assert!(expires_at <= Utc::now() + MAX_KEY_LIFETIME);
    assert!(expires_at >= before + MAX_KEY_LIFETIME);

    assert!(key.key.starts_with(KEY_PREFIX));
    assert!(validate_api_key(&key.key));
}

/// Roles cannot be deleted while keys still reference them
#[tokio::test]
async fn test_role_in_use_guard() {
    let manager = AuthManager::new(memory_store());
    let role = manager.create_role("temp", vec![], None).await.unwrap();
    let key = manager.create_api_key(role.id, "", None, None).await.unwrap();

    assert!(matches!(
        manager.delete_role(role.id).await,
        Err(AuthManagerError::RoleInUse { keys: 1, .. })
    ));

    manager.revoke_api_key(key.id).await.unwrap();
    manager.delete_role(role.id).await.unwrap();
    assert!(matches!(
        manager.get_role(role.id).await,
        Err(AuthManagerError::RoleNotFound(_))
    ));
}

/// Expiration edits: expire now, then remove the expiry again
#[tokio::test]
async fn test_expiration_updates() {
    let store = memory_store();
    let manager = AuthManager::new(store.clone());
    let gate = AuthGate::new(store);

    let role = manager.create_role("svc", vec![], None).await.unwrap();
    let key = manager.create_api_key(role.id, "", None, None).await.unwrap();

    manager
        .update_api_key_expiration(key.id, ExpirationUpdate::Now)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert!(matches!(
        gate.authenticate(AuthRequest::new(Some(key.key.as_str()))).await,
        Err(AuthError::CredentialExpired)
    ));
    assert!(matches!(
        manager.lookup_api_key(&key.key).await,
        Err(AuthManagerError::KeyExpired)
    ));

    let updated = manager
        .update_api_key_expiration(key.id, ExpirationUpdate::Never)
        .await
        .unwrap();
    assert!(updated.expires_at.is_none());
    assert!(gate.authenticate(AuthRequest::new(Some(key.key.as_str()))).await.is_ok());
}

/// Last-used timestamps are written in the background
#[tokio::test]
async fn test_last_used_recorded() {
    let store = memory_store();
    let manager = AuthManager::new(store.clone());
    let gate = AuthGate::new(store.clone());

    let role = manager.create_role("svc", vec![], None).await.unwrap();
    let key = manager.create_api_key(role.id, "", None, None).await.unwrap();
    assert!(key.last_used_at.is_none());

    gate.authenticate(AuthRequest::new(Some(key.key.as_str()))).await.unwrap();

    let mut recorded = None;
    for _ in 0..50 {
        recorded = store.get_api_key(key.id).await.unwrap().and_then(|k| k.last_used_at);
        if recorded.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(recorded.is_some());
}

/// Repeated failures from one address lock it out
#[tokio::test]
async fn test_throttling_across_requests() {
    let tracker = Arc::new(FailedAttemptTracker::new(ThrottleSettings {
        max_attempts: 3,
        ..ThrottleSettings::default()
    }));
    let gate = AuthGate::new(memory_store()).with_tracker(tracker.clone());
    let attacker = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9));
    let bystander = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10));

    for _ in 0..3 {
        let err = gate
            .authenticate(AuthRequest::new(Some("garbage")).from_addr(Some(attacker)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedCredential));
    }

    let err = gate
        .authenticate(AuthRequest::new(Some("garbage")).from_addr(Some(attacker)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Throttled { retry_after_secs } if retry_after_secs > 0));

    let err = gate
        .authenticate(AuthRequest::new(Some("garbage")).from_addr(Some(bystander)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MalformedCredential));
}

/// Roles and keys survive reopening the file store
#[tokio::test]
async fn test_file_store_persistence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data").join("orbitkeys.json");

    let (role_id, token) = {
        let store: Arc<dyn CredentialStore> = Arc::new(FileStore::open(&path).await.unwrap());
        let manager = AuthManager::new(store);
        let role = manager
            .create_role("billing", vec!["invoices:read".to_string()], Some("Billing".into()))
            .await
            .unwrap();
        let key = manager
            .create_api_key(role.id, "billing worker", Some(r#"{"team":"fin"}"#.into()), None)
            .await
            .unwrap();
        (role.id, key.key)
    };

    let store: Arc<dyn CredentialStore> = Arc::new(FileStore::open(&path).await.unwrap());
    let manager = AuthManager::new(store.clone());

    let role = manager.get_role(role_id).await.unwrap();
    assert_eq!(role.name, "billing");
    assert_eq!(role.description.as_deref(), Some("Billing"));

    let (key, key_role) = manager.lookup_api_key(&token).await.unwrap();
    assert_eq!(key_role.id, role_id);
    assert_eq!(key.custom_data.as_deref(), Some(r#"{"team":"fin"}"#));

    // Ids keep increasing after a reopen
    let second = manager.create_role("second", vec![], None).await.unwrap();
    assert!(second.id > role_id);

    let gate = AuthGate::new(store);
    assert!(gate
        .authenticate(AuthRequest::new(Some(token.as_str())).require("invoices:read"))
        .await
        .is_ok());
}

#[test]
fn test_generated_keys_unique() {
    let keys: HashSet<String> = (0..200).map(|_| generate_api_key(32).unwrap()).collect();
    assert_eq!(keys.len(), 200);
    assert!(keys.iter().all(|k| validate_api_key(k) && !k.ends_with('=')));
}

#[test]
fn test_root_key_comparison() {
    let root = generate_api_key(32).unwrap();
    assert!(is_root_api_key(&root, &root));
    assert!(!is_root_api_key(&generate_api_key(32).unwrap(), &root));
    assert!(!is_root_api_key("", &root));
    assert!(!is_root_api_key(&root, ""));
}
