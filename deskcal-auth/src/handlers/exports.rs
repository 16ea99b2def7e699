//! Task export grant management and the public consumption endpoint.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use deskcal_core::error::AppError;
use serde::{Deserialize, Deserializer, Serialize};

use crate::middleware::{bearer_token, AuthUser, SESSION_COOKIE};
use crate::models::export::ExportAclMember;
use crate::models::{ExportState, ExportVisibility, Task, TaskExport};
use crate::services::SessionClaims;
use crate::AppState;

fn member_of(claims: &SessionClaims) -> Result<i64, AppError> {
    claims
        .member_id()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid session")))
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub export_id: i64,
    pub task_id: i64,
    pub token: String,
    pub visibility: ExportVisibility,
    pub state: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<ExportAclMember>>,
}

impl ExportResponse {
    fn new(export: TaskExport, members: Option<Vec<ExportAclMember>>) -> Self {
        let state = match export.state_at(Utc::now()) {
            ExportState::Active => "active",
            ExportState::Revoked => "revoked",
            ExportState::Expired => "expired",
        };
        Self {
            export_id: export.export_id,
            task_id: export.task_id,
            token: export.token,
            visibility: ExportVisibility::parse(&export.visibility_code),
            state: state.to_string(),
            created_by: export.created_by,
            created_at: export.created_at,
            expires_at: export.expires_at,
            revoked_at: export.revoked_at,
            members,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateExportRequest {
    #[serde(default = "default_visibility")]
    pub visibility: ExportVisibility,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_visibility() -> ExportVisibility {
    ExportVisibility::Public
}

/// POST /tasks/:task_id/exports
pub async fn create_export(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(task_id): Path<i64>,
    Json(payload): Json<CreateExportRequest>,
) -> Result<(StatusCode, Json<ExportResponse>), AppError> {
    let member_id = member_of(&claims)?;
    state.access.require_task_access(member_id, task_id).await?;

    if let Some(expires_at) = payload.expires_at {
        if expires_at <= Utc::now() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "expires_at must be in the future"
            )));
        }
    }

    let export = state
        .access
        .exports()
        .create(task_id, member_id, payload.visibility, payload.expires_at)
        .await?;

    tracing::info!(
        export_id = export.export_id,
        task_id,
        member_id,
        visibility = payload.visibility.as_str(),
        "Export created"
    );
    Ok((StatusCode::CREATED, Json(ExportResponse::new(export, None))))
}

/// GET /tasks/:task_id/exports
pub async fn list_exports(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(task_id): Path<i64>,
) -> Result<Json<Vec<ExportResponse>>, AppError> {
    let member_id = member_of(&claims)?;
    state.access.require_task_access(member_id, task_id).await?;

    let exports = state.access.exports().list_for_task(task_id).await?;
    Ok(Json(
        exports
            .into_iter()
            .map(|(export, members)| ExportResponse::new(export, Some(members)))
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct SharedTaskResponse {
    pub task: Task,
    pub visibility: ExportVisibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// GET /exports/shared/:token
///
/// The one endpoint that works without a session when the grant is
/// public. Identity, when present, is still read so restricted grants
/// can admit ACL members.
pub async fn consume_export(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(token): Path<String>,
) -> Result<Json<SharedTaskResponse>, AppError> {
    let session_cookie = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let identity = state
        .access
        .identify(bearer_token(&headers), session_cookie.as_deref())
        .and_then(|claims| claims.member_id());

    let export = state.access.resolve_export_by_token(&token, identity).await?;
    let task = state
        .access
        .directory()
        .find_task(export.task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("export not found")))?;

    Ok(Json(SharedTaskResponse {
        task,
        visibility: export.visibility(),
        expires_at: export.expires_at,
    }))
}

/// Distinguishes an absent field from an explicit null, so PATCH can
/// clear `expires_at` without a sentinel value.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateExportRequest {
    pub visibility: Option<ExportVisibility>,
    #[serde(default, deserialize_with = "double_option")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// PATCH /exports/:export_id
pub async fn update_export(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(export_id): Path<i64>,
    Json(payload): Json<UpdateExportRequest>,
) -> Result<Json<ExportResponse>, AppError> {
    let member_id = member_of(&claims)?;
    let export = state
        .access
        .require_export_management(member_id, export_id)
        .await?;

    if export.revoked_at.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "a revoked export cannot be modified"
        )));
    }

    if let Some(visibility) = payload.visibility {
        state
            .access
            .exports()
            .set_visibility(export_id, visibility)
            .await?;
    }
    if let Some(expires_at) = payload.expires_at {
        if let Some(when) = expires_at {
            if when <= Utc::now() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "expires_at must be in the future"
                )));
            }
        }
        state
            .access
            .exports()
            .set_expiry(export_id, expires_at)
            .await?;
    }

    let (export, _) = state
        .access
        .exports()
        .find_with_workspace(export_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("export not found")))?;
    Ok(Json(ExportResponse::new(export, None)))
}

/// DELETE /exports/:export_id
///
/// Terminal and idempotent: revoking an already-revoked grant is a
/// no-op success.
pub async fn revoke_export(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(export_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let member_id = member_of(&claims)?;
    state
        .access
        .require_export_management(member_id, export_id)
        .await?;
    state.access.exports().revoke(export_id).await?;
    tracing::info!(export_id, member_id, "Export revoked");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AddExportMemberRequest {
    pub member_id: i64,
}

/// POST /exports/:export_id/members
pub async fn add_export_member(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(export_id): Path<i64>,
    Json(payload): Json<AddExportMemberRequest>,
) -> Result<StatusCode, AppError> {
    let member_id = member_of(&claims)?;
    state
        .access
        .require_export_management(member_id, export_id)
        .await?;

    state
        .access
        .directory()
        .find_member(payload.member_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("member not found")))?;

    state
        .access
        .exports()
        .add_acl_member(export_id, payload.member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /exports/:export_id/members/:member_id
pub async fn remove_export_member(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((export_id, target_member_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    let member_id = member_of(&claims)?;
    state
        .access
        .require_export_management(member_id, export_id)
        .await?;

    let removed = state
        .access
        .exports()
        .remove_acl_member(export_id, target_member_id)
        .await?;
    if !removed {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "member is not on this export"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
