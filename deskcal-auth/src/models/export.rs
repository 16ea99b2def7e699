//! Task export grant - time-boxed, revocable bearer access to one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportVisibility {
    Public,
    Restricted,
}

impl ExportVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportVisibility::Public => "public",
            ExportVisibility::Restricted => "restricted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "restricted" => ExportVisibility::Restricted,
            _ => ExportVisibility::Public,
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, ExportVisibility::Restricted)
    }
}

/// Lifecycle state, computed at read time. REVOKED and EXPIRED are
/// terminal; a new grant must be created instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Active,
    Revoked,
    Expired,
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskExport {
    pub export_id: i64,
    pub task_id: i64,
    /// Bearer secret for the public tier. High entropy, URL safe.
    pub token: String,
    pub visibility_code: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl TaskExport {
    pub fn visibility(&self) -> ExportVisibility {
        ExportVisibility::parse(&self.visibility_code)
    }

    /// Revocation takes precedence over expiry when reporting state.
    pub fn state_at(&self, now: DateTime<Utc>) -> ExportState {
        if self.revoked_at.is_some() {
            return ExportState::Revoked;
        }
        match self.expires_at {
            Some(expires_at) if expires_at <= now => ExportState::Expired,
            _ => ExportState::Active,
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == ExportState::Active
    }
}

/// ACL member attached to a restricted export, joined with profile
/// fields for the management UI.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExportAclMember {
    pub member_id: i64,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub profile_image_url: Option<String>,
}
