//! API key issuance and expiry rules

use super::key::{generate_api_key, KeyError, DEFAULT_KEY_LENGTH};
use super::types::{ApiKey, RoleId};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Longest lifetime a key can be issued with (10 years)
pub const MAX_KEY_LIFETIME: Duration = Duration::days(10 * 365);

/// Errors raised while building a new key record
#[derive(Error, Debug)]
pub enum IssueError {
    #[error("role reference is required")]
    MissingRole,

    #[error("failed to generate API key: {0}")]
    Generation(#[from] KeyError),
}

/// Build a new, unsaved API key for `role_id`
///
/// A positive `ttl` sets `expires_at = now + min(ttl, MAX_KEY_LIFETIME)`;
/// a missing or non-positive one leaves the key non-expiring. Nothing is
/// returned unless token generation succeeded.
pub fn issue_api_key(
    role_id: RoleId,
    description: impl Into<String>,
    custom_data: Option<String>,
    ttl: Option<Duration>,
) -> Result<ApiKey, IssueError> {
    issue_api_key_at(role_id, description, custom_data, ttl, Utc::now())
}

pub(crate) fn issue_api_key_at(
    role_id: RoleId,
    description: impl Into<String>,
    custom_data: Option<String>,
    ttl: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<ApiKey, IssueError> {
    if role_id == 0 {
        return Err(IssueError::MissingRole);
    }

    let key = generate_api_key(DEFAULT_KEY_LENGTH)?;

    let expires_at = ttl
        .filter(|ttl| *ttl > Duration::zero())
        .map(|ttl| now + ttl.min(MAX_KEY_LIFETIME));

    Ok(ApiKey {
        id: 0,
        key,
        role_id,
        description: description.into(),
        custom_data,
        created_at: now,
        last_used_at: None,
        expires_at,
    })
}

/// Requested change to a key's expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationUpdate {
    /// Remove the expiry; the key never expires
    Never,
    /// Expire the key immediately
    Now,
    /// Expire after the given duration (capped at [`MAX_KEY_LIFETIME`])
    In(Duration),
}

impl ExpirationUpdate {
    /// Map an "expires in N days" request: absent removes the expiry, a
    /// negative value expires now, out-of-range values hit the cap
    pub fn from_days(days: Option<i64>) -> Self {
        match days {
            None => Self::Never,
            Some(d) if d < 0 => Self::Now,
            Some(d) => Self::In(Duration::try_days(d).unwrap_or(MAX_KEY_LIFETIME)),
        }
    }

    /// The resulting `expires_at` relative to `now`
    pub fn resolve(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Never => None,
            Self::Now => Some(now),
            Self::In(duration) => Some(now + duration.max(Duration::zero()).min(MAX_KEY_LIFETIME)),
        }
    }
}
