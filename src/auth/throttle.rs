//! Failed-attempt tracking for coarse brute-force throttling
//!
//! Tracks failed authentications by client address and locks out addresses
//! that exceed the maximum number of failures within the window. Counts are
//! approximate under contention; an off-by-one between racing requests is
//! acceptable.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Maximum failures inside the window before lockout
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 10;
/// Sliding window for counting failures
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(300); // 5 minutes
/// Lockout duration after too many failures
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(900); // 15 minutes

/// Limits applied by [`FailedAttemptTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    pub max_attempts: u32,
    pub window: Duration,
    pub lockout: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            window: DEFAULT_FAILURE_WINDOW,
            lockout: DEFAULT_LOCKOUT,
        }
    }
}

/// Failed-attempt counter keyed by client address
///
/// Constructed once at startup and shared by reference (usually behind an
/// `Arc`) with every gate that should consult it.
#[derive(Debug, Default)]
pub struct FailedAttemptTracker {
    settings: ThrottleSettings,
    attempts: RwLock<HashMap<IpAddr, Vec<Instant>>>,
    lockouts: RwLock<HashMap<IpAddr, Instant>>,
}

impl FailedAttemptTracker {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            attempts: RwLock::new(HashMap::new()),
            lockouts: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> ThrottleSettings {
        self.settings
    }

    /// Check whether `ip` may attempt authentication
    ///
    /// Returns Err with the remaining lockout in seconds when blocked.
    pub fn check(&self, ip: &IpAddr) -> Result<(), u64> {
        if let Some(lockout_start) = self.lockouts.read().get(ip) {
            let elapsed = lockout_start.elapsed();
            if elapsed < self.settings.lockout {
                let remaining = self.settings.lockout - elapsed;
                return Err(remaining.as_secs().max(1));
            }
        }

        let now = Instant::now();
        let attempts = self.attempts.read();
        if let Some(ip_attempts) = attempts.get(ip) {
            let recent: Vec<&Instant> = ip_attempts
                .iter()
                .filter(|t| now.duration_since(**t) < self.settings.window)
                .collect();

            let max_attempts = self.settings.max_attempts.max(1) as usize;
            if recent.len() >= max_attempts {
                // Blocked until enough in-window attempts age out
                let unblocking = recent[recent.len() - max_attempts];
                let remaining = self
                    .settings
                    .window
                    .saturating_sub(now.duration_since(*unblocking));
                return Err(remaining.as_secs().max(1));
            }
        }

        Ok(())
    }

    /// Record a failed attempt, locking the address out once the limit is hit
    pub fn record_failure(&self, ip: &IpAddr) {
        let now = Instant::now();
        let mut attempts = self.attempts.write();
        let ip_attempts = attempts.entry(*ip).or_default();

        ip_attempts.retain(|t| now.duration_since(*t) < self.settings.window);
        ip_attempts.push(now);

        if ip_attempts.len() >= self.settings.max_attempts as usize {
            drop(attempts);
            self.lockouts.write().insert(*ip, now);
            tracing::warn!(client = %ip, "Too many failed authentication attempts, locking out");
        }
    }

    /// Forget all failures for `ip` after a successful authentication
    pub fn clear(&self, ip: &IpAddr) {
        self.attempts.write().remove(ip);
        self.lockouts.write().remove(ip);
    }

    /// Drop expired entries (call periodically to bound memory)
    pub fn cleanup(&self) {
        let now = Instant::now();

        self.attempts.write().retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < self.settings.window);
            !timestamps.is_empty()
        });

        self.lockouts
            .write()
            .retain(|_, lockout_start| lockout_start.elapsed() < self.settings.lockout);
    }

    /// Number of addresses currently tracked
    pub fn tracked_addresses(&self) -> usize {
        self.attempts.read().len()
    }
}
