use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Who owns a workspace: a single member or a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Personal,
    Team,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Personal => "personal",
            OwnerKind::Team => "team",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "team" => OwnerKind::Team,
            _ => OwnerKind::Personal,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Workspace {
    pub workspace_id: i64,
    pub owner_kind_code: String,
    pub owner_id: i64,
}

impl Workspace {
    pub fn owner_kind(&self) -> OwnerKind {
        OwnerKind::parse(&self.owner_kind_code)
    }
}

/// Minimal task row; everything the access layer needs is the owning
/// workspace. The rest of the task payload belongs to the CRUD layer.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: i64,
    pub workspace_id: i64,
    pub title: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}
