//! PostgreSQL storage for the auth service.
//!
//! One `Database` wrapper implements every store trait the services
//! depend on, so production wiring is a single pool while tests swap
//! in in-memory stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskcal_core::error::AppError;
use sqlx::postgres::PgPool;

use crate::models::export::ExportAclMember;
use crate::models::{
    AdminAccount, ExportVisibility, LoginAttempt, Member, Task, TaskExport, WebhookEventStatus,
    Workspace,
};
use crate::services::access::DirectoryStore;
use crate::services::export::ExportStore;
use crate::services::login_guard::LoginAttemptStore;
use crate::services::webhook_events::WebhookEventStore;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for Database {
    async fn find_member(&self, member_id: i64) -> Result<Option<Member>, AppError> {
        sqlx::query_as::<_, Member>("SELECT * FROM members WHERE member_id = $1")
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_or_create_member(
        &self,
        provider: &str,
        provider_id: &str,
        email: Option<&str>,
        nickname: Option<&str>,
        profile_image_url: Option<&str>,
    ) -> Result<Member, AppError> {
        sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO members (provider, provider_id, email, nickname, profile_image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (provider, provider_id) DO UPDATE SET
                email = EXCLUDED.email,
                nickname = EXCLUDED.nickname,
                profile_image_url = EXCLUDED.profile_image_url
            RETURNING *
            "#,
        )
        .bind(provider)
        .bind(provider_id)
        .bind(email)
        .bind(nickname)
        .bind(profile_image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_admin_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminAccount>, AppError> {
        sqlx::query_as::<_, AdminAccount>(
            "SELECT * FROM admin_accounts WHERE LOWER(username) = LOWER($1)",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_admin_by_id(&self, admin_id: i64) -> Result<Option<AdminAccount>, AppError> {
        sqlx::query_as::<_, AdminAccount>("SELECT * FROM admin_accounts WHERE admin_id = $1")
            .bind(admin_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_task(&self, task_id: i64) -> Result<Option<Task>, AppError> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_workspace(&self, workspace_id: i64) -> Result<Option<Workspace>, AppError> {
        sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE workspace_id = $1")
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn is_team_member(&self, team_id: i64, member_id: i64) -> Result<bool, AppError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM team_members WHERE team_id = $1 AND member_id = $2)",
        )
        .bind(team_id)
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.0)
    }
}

#[async_trait]
impl ExportStore for Database {
    async fn insert_export(
        &self,
        task_id: i64,
        token: &str,
        visibility: ExportVisibility,
        created_by: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<TaskExport, AppError> {
        sqlx::query_as::<_, TaskExport>(
            r#"
            INSERT INTO task_exports (task_id, token, visibility_code, created_by, created_at, expires_at)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(token)
        .bind(visibility.as_str())
        .bind(created_by)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_export_by_token(&self, token: &str) -> Result<Option<TaskExport>, AppError> {
        sqlx::query_as::<_, TaskExport>("SELECT * FROM task_exports WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_export_with_workspace(
        &self,
        export_id: i64,
    ) -> Result<Option<(TaskExport, i64)>, AppError> {
        let row: Option<TaskExportWithWorkspace> = sqlx::query_as(
            r#"
            SELECT e.*, t.workspace_id AS task_workspace_id
            FROM task_exports e
            JOIN tasks t ON t.id = e.task_id
            WHERE e.export_id = $1
            "#,
        )
        .bind(export_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.map(|r| (r.export, r.task_workspace_id)))
    }

    async fn list_exports_for_task(
        &self,
        task_id: i64,
    ) -> Result<Vec<(TaskExport, Vec<ExportAclMember>)>, AppError> {
        let exports = sqlx::query_as::<_, TaskExport>(
            "SELECT * FROM task_exports WHERE task_id = $1 ORDER BY created_at DESC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let mut result = Vec::with_capacity(exports.len());
        for export in exports {
            let members = sqlx::query_as::<_, ExportAclMember>(
                r#"
                SELECT m.member_id, m.nickname, m.email, m.profile_image_url
                FROM task_export_access a
                JOIN members m ON m.member_id = a.member_id
                WHERE a.export_id = $1
                ORDER BY m.member_id
                "#,
            )
            .bind(export.export_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
            result.push((export, members));
        }
        Ok(result)
    }

    async fn mark_export_revoked(
        &self,
        export_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE task_exports SET revoked_at = $1 WHERE export_id = $2 AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(export_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_export_visibility(
        &self,
        export_id: i64,
        visibility: ExportVisibility,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE task_exports SET visibility_code = $1 WHERE export_id = $2")
                .bind(visibility.as_str())
                .bind(export_id)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_export_expiry(
        &self,
        export_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE task_exports SET expires_at = $1 WHERE export_id = $2")
            .bind(expires_at)
            .bind(export_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_export_member(&self, export_id: i64, member_id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO task_export_access (export_id, member_id, granted_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(export_id)
        .bind(member_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn remove_export_member(
        &self,
        export_id: i64,
        member_id: i64,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM task_export_access WHERE export_id = $1 AND member_id = $2")
                .bind(export_id)
                .bind(member_id)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn member_has_export_access(
        &self,
        export_id: i64,
        member_id: i64,
    ) -> Result<bool, AppError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM task_export_access WHERE export_id = $1 AND member_id = $2)",
        )
        .bind(export_id)
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.0)
    }
}

#[async_trait]
impl LoginAttemptStore for Database {
    async fn find_attempt(
        &self,
        username: &str,
        source_address: &str,
    ) -> Result<Option<LoginAttempt>, AppError> {
        sqlx::query_as::<_, LoginAttempt>(
            "SELECT * FROM admin_login_attempts WHERE username = $1 AND source_address = $2",
        )
        .bind(username)
        .bind(source_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn insert_first_failure(
        &self,
        username: &str,
        source_address: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO admin_login_attempts (username, source_address, fail_count, first_failed_at, last_failed_at)
            VALUES ($1, $2, 1, $3, $3)
            ON CONFLICT (username, source_address) DO UPDATE SET
                fail_count = admin_login_attempts.fail_count + 1,
                last_failed_at = EXCLUDED.last_failed_at
            "#,
        )
        .bind(username)
        .bind(source_address)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn update_failure(
        &self,
        attempt_id: i64,
        fail_count: i32,
        window_reset: bool,
        now: DateTime<Utc>,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        if window_reset {
            sqlx::query(
                r#"
                UPDATE admin_login_attempts
                SET fail_count = $1, first_failed_at = $2, last_failed_at = $2,
                    locked_until = $3
                WHERE attempt_id = $4
                "#,
            )
            .bind(fail_count)
            .bind(now)
            .bind(locked_until)
            .bind(attempt_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        } else {
            sqlx::query(
                r#"
                UPDATE admin_login_attempts
                SET fail_count = $1, last_failed_at = $2, locked_until = $3
                WHERE attempt_id = $4
                "#,
            )
            .bind(fail_count)
            .bind(now)
            .bind(locked_until)
            .bind(attempt_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        }
        Ok(())
    }

    async fn delete_attempts(
        &self,
        username: &str,
        source_address: &str,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM admin_login_attempts WHERE username = $1 AND source_address = $2")
            .bind(username)
            .bind(source_address)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

#[async_trait]
impl WebhookEventStore for Database {
    async fn claim(
        &self,
        provider: &str,
        event_id: &str,
        event_type: &str,
        payload_json: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // ON CONFLICT DO NOTHING makes the insert the atomic claim:
        // exactly one of N concurrent callers sees rows_affected = 1.
        let result = sqlx::query(
            r#"
            INSERT INTO payment_webhook_events (provider, event_id, event_type, status_code, payload_json, received_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .bind(event_type)
        .bind(WebhookEventStatus::Processing.as_str())
        .bind(payload_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        provider: &str,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE payment_webhook_events
            SET status_code = $1, processed_at = $2
            WHERE provider = $3 AND event_id = $4
            "#,
        )
        .bind(WebhookEventStatus::Completed.as_str())
        .bind(now)
        .bind(provider)
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn release(&self, provider: &str, event_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            DELETE FROM payment_webhook_events
            WHERE provider = $1 AND event_id = $2 AND status_code = $3
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .bind(WebhookEventStatus::Processing.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

/// Joined row for [`ExportStore::find_export_with_workspace`].
struct TaskExportWithWorkspace {
    export: TaskExport,
    task_workspace_id: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for TaskExportWithWorkspace {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            export: TaskExport::from_row(row)?,
            task_workspace_id: row.try_get("task_workspace_id")?,
        })
    }
}
