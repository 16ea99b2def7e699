use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use deskcal_core::error::AppError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::middleware::{AuthUser, SESSION_COOKIE};
use crate::models::member::MemberProfile;
use crate::services::{SessionIdentity, TokenPair};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/refresh
///
/// A valid refresh token buys a whole new pair. Identity fields are
/// re-read from the directory so a nickname change shows up at the
/// next refresh rather than at the next sign-in.
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let claims = state
        .access
        .jwt()
        .verify_refresh(&payload.refresh_token)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired refresh token")))?;

    let member_id = claims
        .member_id()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired refresh token")))?;
    let member = state
        .access
        .directory()
        .find_member(member_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Account no longer exists")))?;

    let identity = SessionIdentity {
        member_id: member.member_id,
        nickname: member.display_name().to_string(),
        provider: member.provider.clone(),
        email: member.email.clone(),
    };
    let pair = state.access.jwt().issue_pair(&identity)?;
    Ok(Json(pair))
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MemberProfile>, AppError> {
    let member_id = claims
        .member_id()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid session")))?;
    let member = state
        .access
        .directory()
        .find_member(member_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Member not found")))?;
    Ok(Json(MemberProfile::from(member)))
}

/// POST /auth/logout
///
/// Tokens are not blacklisted; logout clears the browser session
/// cookie and the client discards its stored pair.
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (jar, Json(json!({ "status": "logged_out" })))
}
