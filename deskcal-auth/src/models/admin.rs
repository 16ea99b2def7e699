use serde::Serialize;
use sqlx::FromRow;

/// Privileged operator account. The only password-authenticated login
/// path in the service, and the only one behind the lockout guard.
#[derive(Debug, Clone, FromRow)]
pub struct AdminAccount {
    pub admin_id: i64,
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AdminProfile {
    pub admin_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: String,
}

impl From<AdminAccount> for AdminProfile {
    fn from(a: AdminAccount) -> Self {
        Self {
            admin_id: a.admin_id,
            username: a.username,
            display_name: a.display_name,
            email: a.email,
            role: a.role,
        }
    }
}
