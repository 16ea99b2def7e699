//! Task export grants: capability tokens for sharing one task outside
//! the authentication perimeter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskcal_core::error::AppError;
use rand::RngCore;
use std::sync::Arc;

use crate::models::export::ExportAclMember;
use crate::models::{ExportVisibility, TaskExport};

const TOKEN_BYTES: usize = 24;

/// Storage for export grants and their ACLs.
#[async_trait]
pub trait ExportStore: Send + Sync {
    async fn insert_export(
        &self,
        task_id: i64,
        token: &str,
        visibility: ExportVisibility,
        created_by: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<TaskExport, AppError>;

    async fn find_export_by_token(&self, token: &str) -> Result<Option<TaskExport>, AppError>;

    /// Export joined with the owning task's workspace, for the
    /// authenticated management path.
    async fn find_export_with_workspace(
        &self,
        export_id: i64,
    ) -> Result<Option<(TaskExport, i64)>, AppError>;

    async fn list_exports_for_task(
        &self,
        task_id: i64,
    ) -> Result<Vec<(TaskExport, Vec<ExportAclMember>)>, AppError>;

    /// Sets `revoked_at`; rows are never deleted (audit trail).
    async fn mark_export_revoked(
        &self,
        export_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn update_export_visibility(
        &self,
        export_id: i64,
        visibility: ExportVisibility,
    ) -> Result<bool, AppError>;

    async fn update_export_expiry(
        &self,
        export_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError>;

    /// Idempotent: adding an existing member is a no-op.
    async fn add_export_member(&self, export_id: i64, member_id: i64) -> Result<(), AppError>;

    async fn remove_export_member(&self, export_id: i64, member_id: i64)
        -> Result<bool, AppError>;

    async fn member_has_export_access(
        &self,
        export_id: i64,
        member_id: i64,
    ) -> Result<bool, AppError>;
}

/// Grant lifecycle and token minting. ACL membership is deliberately
/// independent of team membership: removing a member from the owning
/// team does not revoke export access they were granted (stable
/// sharing list; product decision, see DESIGN.md).
#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn ExportStore>,
}

impl ExportService {
    pub fn new(store: Arc<dyn ExportStore>) -> Self {
        Self { store }
    }

    /// Mint a grant with a fresh unguessable bearer token. The creator
    /// is added to the ACL so flipping visibility to restricted later
    /// never locks them out.
    pub async fn create(
        &self,
        task_id: i64,
        created_by: i64,
        visibility: ExportVisibility,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<TaskExport, AppError> {
        let token = mint_token();
        let export = self
            .store
            .insert_export(task_id, &token, visibility, created_by, expires_at)
            .await?;
        self.store
            .add_export_member(export.export_id, created_by)
            .await?;
        Ok(export)
    }

    pub async fn revoke(&self, export_id: i64) -> Result<bool, AppError> {
        self.store.mark_export_revoked(export_id, Utc::now()).await
    }

    pub async fn set_visibility(
        &self,
        export_id: i64,
        visibility: ExportVisibility,
    ) -> Result<bool, AppError> {
        self.store
            .update_export_visibility(export_id, visibility)
            .await
    }

    pub async fn set_expiry(
        &self,
        export_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        self.store.update_export_expiry(export_id, expires_at).await
    }

    pub async fn add_acl_member(&self, export_id: i64, member_id: i64) -> Result<(), AppError> {
        self.store.add_export_member(export_id, member_id).await
    }

    pub async fn remove_acl_member(
        &self,
        export_id: i64,
        member_id: i64,
    ) -> Result<bool, AppError> {
        self.store.remove_export_member(export_id, member_id).await
    }

    pub async fn has_access(&self, export_id: i64, member_id: i64) -> Result<bool, AppError> {
        self.store
            .member_has_export_access(export_id, member_id)
            .await
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<TaskExport>, AppError> {
        self.store.find_export_by_token(token).await
    }

    pub async fn find_with_workspace(
        &self,
        export_id: i64,
    ) -> Result<Option<(TaskExport, i64)>, AppError> {
        self.store.find_export_with_workspace(export_id).await
    }

    pub async fn list_for_task(
        &self,
        task_id: i64,
    ) -> Result<Vec<(TaskExport, Vec<ExportAclMember>)>, AppError> {
        self.store.list_exports_for_task(task_id).await
    }
}

/// 24 random bytes, hex encoded: 48 URL-safe characters of entropy.
fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
