//! Central access resolver: every handler that touches a workspace,
//! task, or export grant funnels its checks through here so the
//! existence / revocation / visibility / membership ordering is decided
//! in exactly one place.

use async_trait::async_trait;
use chrono::Utc;
use deskcal_core::error::AppError;
use std::sync::Arc;

use crate::models::{AdminAccount, ExportState, Member, OwnerKind, Task, TaskExport, Workspace};
use crate::services::export::ExportService;
use crate::services::jwt::{JwtService, SessionClaims};

/// Reads over the member / workspace / task directory.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_member(&self, member_id: i64) -> Result<Option<Member>, AppError>;

    /// Upsert keyed on (provider, provider_id); refreshes profile
    /// fields from the provider on every login.
    async fn find_or_create_member(
        &self,
        provider: &str,
        provider_id: &str,
        email: Option<&str>,
        nickname: Option<&str>,
        profile_image_url: Option<&str>,
    ) -> Result<Member, AppError>;

    async fn find_admin_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminAccount>, AppError>;

    async fn find_admin_by_id(&self, admin_id: i64) -> Result<Option<AdminAccount>, AppError>;

    async fn find_task(&self, task_id: i64) -> Result<Option<Task>, AppError>;

    async fn find_workspace(&self, workspace_id: i64) -> Result<Option<Workspace>, AppError>;

    async fn is_team_member(&self, team_id: i64, member_id: i64) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct AccessService {
    jwt: JwtService,
    directory: Arc<dyn DirectoryStore>,
    exports: ExportService,
}

impl AccessService {
    pub fn new(jwt: JwtService, directory: Arc<dyn DirectoryStore>, exports: ExportService) -> Self {
        Self {
            jwt,
            directory,
            exports,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn exports(&self) -> &ExportService {
        &self.exports
    }

    pub fn directory(&self) -> &Arc<dyn DirectoryStore> {
        &self.directory
    }

    /// Resolve a caller identity from transport credentials: an
    /// Authorization bearer token wins, then the session cookie.
    pub fn identify(
        &self,
        bearer: Option<&str>,
        session_cookie: Option<&str>,
    ) -> Option<SessionClaims> {
        bearer
            .and_then(|t| self.jwt.verify_access(t))
            .or_else(|| session_cookie.and_then(|t| self.jwt.verify_access(t)))
    }

    /// Does `member_id` get at resources owned by this owner? Personal
    /// workspaces admit only their owner; team workspaces admit current
    /// team members.
    pub async fn check_owner_access(
        &self,
        member_id: i64,
        owner_kind: OwnerKind,
        owner_id: i64,
    ) -> Result<bool, AppError> {
        match owner_kind {
            OwnerKind::Personal => Ok(owner_id == member_id),
            OwnerKind::Team => self.directory.is_team_member(owner_id, member_id).await,
        }
    }

    pub async fn require_workspace_access(
        &self,
        member_id: i64,
        workspace_id: i64,
    ) -> Result<Workspace, AppError> {
        let workspace = self
            .directory
            .find_workspace(workspace_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("workspace not found")))?;
        if !self
            .check_owner_access(member_id, workspace.owner_kind(), workspace.owner_id)
            .await?
        {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "no access to this workspace"
            )));
        }
        Ok(workspace)
    }

    /// Task existence is hidden from non-members: a caller without
    /// workspace access sees the same 404 as for a task that does not
    /// exist.
    pub async fn require_task_access(
        &self,
        member_id: i64,
        task_id: i64,
    ) -> Result<Task, AppError> {
        let task = self
            .directory
            .find_task(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("task not found")))?;
        self.require_workspace_access(member_id, task.workspace_id)
            .await
            .map_err(|e| match e {
                AppError::Forbidden(_) => AppError::NotFound(anyhow::anyhow!("task not found")),
                other => other,
            })?;
        Ok(task)
    }

    /// Public consumption path. Checks run strictly in order:
    /// existence, then lifecycle (revocation wins over expiry), then
    /// visibility, then ACL membership.
    pub async fn resolve_export_by_token(
        &self,
        token: &str,
        identity: Option<i64>,
    ) -> Result<TaskExport, AppError> {
        let export = self
            .exports
            .find_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("export not found")))?;

        match export.state_at(Utc::now()) {
            ExportState::Revoked => {
                return Err(AppError::Gone(anyhow::anyhow!("export has been revoked")));
            }
            ExportState::Expired => {
                return Err(AppError::Gone(anyhow::anyhow!("export has expired")));
            }
            ExportState::Active => {}
        }

        if export.visibility().is_restricted() {
            let member_id = identity.ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("sign in to view this export"))
            })?;
            if !self.exports.has_access(export.export_id, member_id).await? {
                return Err(AppError::Forbidden(anyhow::anyhow!(
                    "you have not been granted access to this export"
                )));
            }
        }

        Ok(export)
    }

    /// Management path (revoke, visibility, expiry, ACL edits): the
    /// caller must be able to access the owning task's workspace. Here
    /// 403 and 404 stay distinct because the caller already proved who
    /// they are.
    pub async fn require_export_management(
        &self,
        member_id: i64,
        export_id: i64,
    ) -> Result<TaskExport, AppError> {
        let (export, workspace_id) = self
            .exports
            .find_with_workspace(export_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("export not found")))?;
        self.require_workspace_access(member_id, workspace_id)
            .await?;
        Ok(export)
    }
}
