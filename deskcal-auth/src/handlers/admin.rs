//! Privileged admin console login, behind the brute-force guard.

use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use deskcal_core::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::middleware::{bearer_token, ADMIN_COOKIE};
use crate::models::admin::AdminProfile;
use crate::services::login_guard::client_address;
use crate::services::{SessionIdentity, TokenPair};
use crate::utils::{verify_password, Password, PasswordHashString};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(length(min = 1, max = 512))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub admin: AdminProfile,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// POST /admin/login
///
/// The guard is consulted before the password is ever touched, and a
/// failure is recorded whether the username exists or not, so the
/// lockout cannot be used to enumerate which admin accounts exist.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<AdminLoginRequest>,
) -> Result<(CookieJar, Json<AdminLoginResponse>), AppError> {
    payload.validate()?;

    let source_address = client_address(&headers);
    let gate = state
        .login_guard
        .check_allowed(&payload.username, &source_address)
        .await?;
    if !gate.allowed {
        tracing::warn!(
            username = %payload.username,
            source_address = %source_address,
            retry_after = gate.retry_after_seconds,
            "Locked-out admin login attempt"
        );
        return Err(AppError::TooManyRequests(
            "Too many failed login attempts, try again later".to_string(),
            Some(gate.retry_after_seconds),
        ));
    }

    let admin = state
        .access
        .directory()
        .find_admin_by_username(&payload.username)
        .await?;

    let password = Password::new(payload.password);
    let admin = admin.filter(|account| {
        verify_password(
            &password,
            &PasswordHashString::new(account.password_hash.clone()),
        )
        .unwrap_or(false)
    });

    let Some(admin) = admin else {
        state
            .login_guard
            .record_failure(&payload.username, &source_address)
            .await?;
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid username or password"
        )));
    };

    state
        .login_guard
        .clear_failures(&payload.username, &source_address)
        .await?;

    let identity = SessionIdentity {
        member_id: admin.admin_id,
        nickname: admin
            .display_name
            .clone()
            .unwrap_or_else(|| admin.username.clone()),
        provider: "admin".to_string(),
        email: admin.email.clone(),
    };
    let tokens = state.access.jwt().issue_admin_pair(&identity)?;

    let jar = jar.add(
        Cookie::build((ADMIN_COOKIE, tokens.access_token.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(state.config.is_prod())
            .max_age(time::Duration::seconds(
                state.access.jwt().access_token_expiry_seconds(),
            ))
            .build(),
    );

    tracing::info!(admin_id = admin.admin_id, "Admin signed in");
    Ok((
        jar,
        Json(AdminLoginResponse {
            admin: AdminProfile::from(admin),
            tokens,
        }),
    ))
}

/// GET /admin/me
///
/// Accepts the admin session cookie or a bearer token; member session
/// credentials are rejected here just as admin ones are on member routes.
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<AdminProfile>, AppError> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or_else(|| jar.get(ADMIN_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

    let claims = state
        .access
        .jwt()
        .verify_admin_access(&token)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;
    let admin_id = claims
        .member_id()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid session")))?;

    let admin = state
        .access
        .directory()
        .find_admin_by_id(admin_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Account no longer exists")))?;

    Ok(Json(AdminProfile::from(admin)))
}

/// POST /admin/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(Cookie::build(ADMIN_COOKIE).path("/").build());
    (jar, Json(json!({ "status": "logged_out" })))
}
