use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A workspace member, keyed by the OAuth identity that created it.
#[derive(Debug, Clone, FromRow)]
pub struct Member {
    pub member_id: i64,
    pub provider: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or("member")
    }
}

/// Member shape returned to clients. Never includes provider ids.
#[derive(Debug, Serialize)]
pub struct MemberProfile {
    pub member_id: i64,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub profile_image_url: Option<String>,
    pub provider: String,
}

impl From<Member> for MemberProfile {
    fn from(m: Member) -> Self {
        Self {
            member_id: m.member_id,
            nickname: m.nickname,
            email: m.email,
            profile_image_url: m.profile_image_url,
            provider: m.provider,
        }
    }
}
