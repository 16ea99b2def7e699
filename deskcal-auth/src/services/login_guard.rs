//! Brute-force guard for the privileged (admin) login path.
//!
//! Failure counters are keyed by (normalized username, source address)
//! so one noisy address cannot lock out an account for everyone else,
//! and one account cannot be locked for a whole NAT. The
//! check-then-record sequence is read-then-write; two concurrent
//! failures can undercount by one. The guard is a deterrent, not a
//! cryptographic boundary, and that bounded undercount is accepted.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use deskcal_core::error::AppError;
use std::sync::Arc;

use crate::config::LockoutConfig;
use crate::models::LoginAttempt;

const UNKNOWN_ADDRESS: &str = "unknown";

/// Storage for login failure counters. Row semantics only; the window
/// and threshold arithmetic lives in [`LoginGuardService`].
#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn find_attempt(
        &self,
        username: &str,
        source_address: &str,
    ) -> Result<Option<LoginAttempt>, AppError>;

    async fn insert_first_failure(
        &self,
        username: &str,
        source_address: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn update_failure(
        &self,
        attempt_id: i64,
        fail_count: i32,
        window_reset: bool,
        now: DateTime<Utc>,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;

    async fn delete_attempts(&self, username: &str, source_address: &str)
        -> Result<(), AppError>;
}

/// Outcome of the read-only lockout check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginGate {
    pub allowed: bool,
    pub retry_after_seconds: u64,
}

impl LoginGate {
    fn open() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
        }
    }
}

#[derive(Clone)]
pub struct LoginGuardService {
    store: Arc<dyn LoginAttemptStore>,
    max_failed_attempts: u32,
    window: Duration,
    lockout: Duration,
}

impl LoginGuardService {
    pub fn new(store: Arc<dyn LoginAttemptStore>, config: &LockoutConfig) -> Self {
        Self {
            store,
            max_failed_attempts: config.max_failed_attempts,
            window: Duration::minutes(config.window_minutes),
            lockout: Duration::minutes(config.lockout_minutes),
        }
    }

    /// Read-only fast path: consults only `locked_until` vs now and
    /// never mutates state.
    pub async fn check_allowed(
        &self,
        username: &str,
        source_address: &str,
    ) -> Result<LoginGate, AppError> {
        let username = normalize_username(username);
        let Some(attempt) = self.store.find_attempt(&username, source_address).await? else {
            return Ok(LoginGate::open());
        };

        let now = Utc::now();
        match attempt.locked_until {
            Some(locked_until) if locked_until > now => {
                let remaining = (locked_until - now).num_milliseconds();
                let retry_after_seconds = ((remaining + 999) / 1000).max(1) as u64;
                Ok(LoginGate {
                    allowed: false,
                    retry_after_seconds,
                })
            }
            _ => Ok(LoginGate::open()),
        }
    }

    /// Record one failed attempt. A failure outside the rolling window
    /// starts a fresh counter; at the threshold an absolute
    /// `locked_until` is set and further failures do not extend it.
    pub async fn record_failure(
        &self,
        username: &str,
        source_address: &str,
    ) -> Result<(), AppError> {
        let username = normalize_username(username);
        let now = Utc::now();

        let Some(attempt) = self.store.find_attempt(&username, source_address).await? else {
            return self
                .store
                .insert_first_failure(&username, source_address, now)
                .await;
        };

        let window_start = now - self.window;
        let window_reset = attempt.last_failed_at < window_start;
        let fail_count = if window_reset {
            1
        } else {
            attempt.fail_count + 1
        };

        let locked_until = match attempt.locked_until {
            // An unexpired lock stays as issued.
            Some(existing) if existing > now => Some(existing),
            _ => {
                if fail_count >= self.max_failed_attempts as i32 {
                    Some(now + self.lockout)
                } else {
                    None
                }
            }
        };

        self.store
            .update_failure(attempt.attempt_id, fail_count, window_reset, now, locked_until)
            .await
    }

    /// A successful login deletes the counter outright.
    pub async fn clear_failures(
        &self,
        username: &str,
        source_address: &str,
    ) -> Result<(), AppError> {
        let username = normalize_username(username);
        self.store.delete_attempts(&username, source_address).await
    }
}

/// Variant casings of the same account share one counter.
pub fn normalize_username(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Caller network address for the lockout key, taken from the usual
/// proxy headers.
pub fn client_address(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}
