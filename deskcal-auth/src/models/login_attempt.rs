use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Failure counter for one (normalized username, source address) pair.
/// Created on first failure, deleted outright on a successful login.
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttempt {
    pub attempt_id: i64,
    pub username: String,
    pub source_address: String,
    pub fail_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}
