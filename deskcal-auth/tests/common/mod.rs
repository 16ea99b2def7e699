//! In-memory store fixtures so service behavior can be exercised
//! without a running Postgres.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskcal_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use deskcal_auth::models::export::ExportAclMember;
use deskcal_auth::models::{
    AdminAccount, ExportVisibility, LoginAttempt, Member, Task, TaskExport, WebhookEvent,
    WebhookEventStatus, Workspace,
};
use deskcal_auth::services::access::DirectoryStore;
use deskcal_auth::services::export::ExportStore;
use deskcal_auth::services::login_guard::LoginAttemptStore;
use deskcal_auth::services::webhook_events::WebhookEventStore;

// ---------------------------------------------------------------- directory

#[derive(Default)]
pub struct MemoryDirectory {
    inner: Mutex<DirectoryState>,
}

#[derive(Default)]
struct DirectoryState {
    members: HashMap<i64, Member>,
    admins: HashMap<String, AdminAccount>,
    tasks: HashMap<i64, Task>,
    workspaces: HashMap<i64, Workspace>,
    team_members: HashSet<(i64, i64)>,
    next_member_id: i64,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, member_id: i64, nickname: &str) {
        let mut state = self.inner.lock().unwrap();
        state.members.insert(
            member_id,
            Member {
                member_id,
                provider: "google".to_string(),
                provider_id: format!("sub-{}", member_id),
                email: Some(format!("{}@example.com", nickname)),
                nickname: Some(nickname.to_string()),
                profile_image_url: None,
                created_at: Utc::now(),
            },
        );
    }

    pub fn add_admin(&self, admin_id: i64, username: &str, password_hash: &str) {
        let mut state = self.inner.lock().unwrap();
        state.admins.insert(
            username.to_lowercase(),
            AdminAccount {
                admin_id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                display_name: None,
                email: None,
                role: "admin".to_string(),
            },
        );
    }

    pub fn add_personal_workspace(&self, workspace_id: i64, owner_member_id: i64) {
        let mut state = self.inner.lock().unwrap();
        state.workspaces.insert(
            workspace_id,
            Workspace {
                workspace_id,
                owner_kind_code: "personal".to_string(),
                owner_id: owner_member_id,
            },
        );
    }

    pub fn add_team_workspace(&self, workspace_id: i64, team_id: i64) {
        let mut state = self.inner.lock().unwrap();
        state.workspaces.insert(
            workspace_id,
            Workspace {
                workspace_id,
                owner_kind_code: "team".to_string(),
                owner_id: team_id,
            },
        );
    }

    pub fn join_team(&self, team_id: i64, member_id: i64) {
        let mut state = self.inner.lock().unwrap();
        state.team_members.insert((team_id, member_id));
    }

    pub fn leave_team(&self, team_id: i64, member_id: i64) {
        let mut state = self.inner.lock().unwrap();
        state.team_members.remove(&(team_id, member_id));
    }

    pub fn add_task(&self, task_id: i64, workspace_id: i64, created_by: i64) {
        let mut state = self.inner.lock().unwrap();
        state.tasks.insert(
            task_id,
            Task {
                id: task_id,
                workspace_id,
                title: format!("task {}", task_id),
                created_by,
                created_at: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn find_member(&self, member_id: i64) -> Result<Option<Member>, AppError> {
        Ok(self.inner.lock().unwrap().members.get(&member_id).cloned())
    }

    async fn find_or_create_member(
        &self,
        provider: &str,
        provider_id: &str,
        email: Option<&str>,
        nickname: Option<&str>,
        profile_image_url: Option<&str>,
    ) -> Result<Member, AppError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(existing) = state
            .members
            .values()
            .find(|m| m.provider == provider && m.provider_id == provider_id)
            .cloned()
        {
            let refreshed = Member {
                email: email.map(|s| s.to_string()),
                nickname: nickname.map(|s| s.to_string()),
                profile_image_url: profile_image_url.map(|s| s.to_string()),
                ..existing
            };
            state.members.insert(refreshed.member_id, refreshed.clone());
            return Ok(refreshed);
        }
        state.next_member_id += 1;
        let member = Member {
            member_id: state.next_member_id + 1000,
            provider: provider.to_string(),
            provider_id: provider_id.to_string(),
            email: email.map(|s| s.to_string()),
            nickname: nickname.map(|s| s.to_string()),
            profile_image_url: profile_image_url.map(|s| s.to_string()),
            created_at: Utc::now(),
        };
        state.members.insert(member.member_id, member.clone());
        Ok(member)
    }

    async fn find_admin_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminAccount>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .admins
            .get(&username.to_lowercase())
            .cloned())
    }

    async fn find_admin_by_id(&self, admin_id: i64) -> Result<Option<AdminAccount>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .admins
            .values()
            .find(|a| a.admin_id == admin_id)
            .cloned())
    }

    async fn find_task(&self, task_id: i64) -> Result<Option<Task>, AppError> {
        Ok(self.inner.lock().unwrap().tasks.get(&task_id).cloned())
    }

    async fn find_workspace(&self, workspace_id: i64) -> Result<Option<Workspace>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .workspaces
            .get(&workspace_id)
            .cloned())
    }

    async fn is_team_member(&self, team_id: i64, member_id: i64) -> Result<bool, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .team_members
            .contains(&(team_id, member_id)))
    }
}

// ---------------------------------------------------------------- exports

#[derive(Default)]
pub struct MemoryExportStore {
    inner: Mutex<ExportState>,
}

#[derive(Default)]
struct ExportState {
    exports: HashMap<i64, TaskExport>,
    acl: HashSet<(i64, i64)>,
    task_workspaces: HashMap<i64, i64>,
    next_id: i64,
}

impl MemoryExportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror of the tasks table join used by the management path.
    pub fn map_task_to_workspace(&self, task_id: i64, workspace_id: i64) {
        let mut state = self.inner.lock().unwrap();
        state.task_workspaces.insert(task_id, workspace_id);
    }
}

#[async_trait]
impl ExportStore for MemoryExportStore {
    async fn insert_export(
        &self,
        task_id: i64,
        token: &str,
        visibility: ExportVisibility,
        created_by: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<TaskExport, AppError> {
        let mut state = self.inner.lock().unwrap();
        state.next_id += 1;
        let export = TaskExport {
            export_id: state.next_id,
            task_id,
            token: token.to_string(),
            visibility_code: visibility.as_str().to_string(),
            created_by,
            created_at: Utc::now(),
            expires_at,
            revoked_at: None,
        };
        state.exports.insert(export.export_id, export.clone());
        Ok(export)
    }

    async fn find_export_by_token(&self, token: &str) -> Result<Option<TaskExport>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .exports
            .values()
            .find(|e| e.token == token)
            .cloned())
    }

    async fn find_export_with_workspace(
        &self,
        export_id: i64,
    ) -> Result<Option<(TaskExport, i64)>, AppError> {
        let state = self.inner.lock().unwrap();
        Ok(state.exports.get(&export_id).and_then(|e| {
            state
                .task_workspaces
                .get(&e.task_id)
                .map(|ws| (e.clone(), *ws))
        }))
    }

    async fn list_exports_for_task(
        &self,
        task_id: i64,
    ) -> Result<Vec<(TaskExport, Vec<ExportAclMember>)>, AppError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .exports
            .values()
            .filter(|e| e.task_id == task_id)
            .map(|e| {
                let members = state
                    .acl
                    .iter()
                    .filter(|(export_id, _)| *export_id == e.export_id)
                    .map(|(_, member_id)| ExportAclMember {
                        member_id: *member_id,
                        nickname: None,
                        email: None,
                        profile_image_url: None,
                    })
                    .collect();
                (e.clone(), members)
            })
            .collect())
    }

    async fn mark_export_revoked(
        &self,
        export_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.inner.lock().unwrap();
        match state.exports.get_mut(&export_id) {
            Some(export) if export.revoked_at.is_none() => {
                export.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_export_visibility(
        &self,
        export_id: i64,
        visibility: ExportVisibility,
    ) -> Result<bool, AppError> {
        let mut state = self.inner.lock().unwrap();
        match state.exports.get_mut(&export_id) {
            Some(export) => {
                export.visibility_code = visibility.as_str().to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_export_expiry(
        &self,
        export_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let mut state = self.inner.lock().unwrap();
        match state.exports.get_mut(&export_id) {
            Some(export) => {
                export.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_export_member(&self, export_id: i64, member_id: i64) -> Result<(), AppError> {
        self.inner.lock().unwrap().acl.insert((export_id, member_id));
        Ok(())
    }

    async fn remove_export_member(
        &self,
        export_id: i64,
        member_id: i64,
    ) -> Result<bool, AppError> {
        Ok(self.inner.lock().unwrap().acl.remove(&(export_id, member_id)))
    }

    async fn member_has_export_access(
        &self,
        export_id: i64,
        member_id: i64,
    ) -> Result<bool, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .acl
            .contains(&(export_id, member_id)))
    }
}

// ---------------------------------------------------------------- lockout

#[derive(Default)]
pub struct MemoryLoginStore {
    inner: Mutex<LoginState>,
}

#[derive(Default)]
struct LoginState {
    attempts: HashMap<(String, String), LoginAttempt>,
    next_id: i64,
}

impl MemoryLoginStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_count(&self, username: &str, source_address: &str) -> Option<i32> {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .get(&(username.to_string(), source_address.to_string()))
            .map(|a| a.fail_count)
    }

    pub fn locked_until(&self, username: &str, source_address: &str) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .get(&(username.to_string(), source_address.to_string()))
            .and_then(|a| a.locked_until)
    }

    /// Shifts the stored timestamps backwards to simulate elapsed time.
    pub fn backdate(&self, username: &str, source_address: &str, by: chrono::Duration) {
        let mut state = self.inner.lock().unwrap();
        if let Some(attempt) = state
            .attempts
            .get_mut(&(username.to_string(), source_address.to_string()))
        {
            attempt.first_failed_at -= by;
            attempt.last_failed_at -= by;
            if let Some(locked_until) = attempt.locked_until.as_mut() {
                *locked_until = *locked_until - by;
            }
        }
    }
}

#[async_trait]
impl LoginAttemptStore for MemoryLoginStore {
    async fn find_attempt(
        &self,
        username: &str,
        source_address: &str,
    ) -> Result<Option<LoginAttempt>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .attempts
            .get(&(username.to_string(), source_address.to_string()))
            .cloned())
    }

    async fn insert_first_failure(
        &self,
        username: &str,
        source_address: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        state.next_id += 1;
        let attempt = LoginAttempt {
            attempt_id: state.next_id,
            username: username.to_string(),
            source_address: source_address.to_string(),
            fail_count: 1,
            first_failed_at: now,
            last_failed_at: now,
            locked_until: None,
        };
        state
            .attempts
            .insert((username.to_string(), source_address.to_string()), attempt);
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
        let mut state = self.inner.lock().unwrap();
        if let Some(attempt) = state
            .attempts
            .values_mut()
            .find(|a| a.attempt_id == attempt_id)
        {
            attempt.fail_count = fail_count;
            if window_reset {
                attempt.first_failed_at = now;
            }
            attempt.last_failed_at = now;
            attempt.locked_until = locked_until;
        }
        Ok(())
    }

    async fn delete_attempts(
        &self,
        username: &str,
        source_address: &str,
    ) -> Result<(), AppError> {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .remove(&(username.to_string(), source_address.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------- webhooks

#[derive(Default)]
pub struct MemoryWebhookStore {
    inner: Mutex<HashMap<(String, String), WebhookEvent>>,
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, provider: &str, event_id: &str) -> Option<WebhookEventStatus> {
        self.inner
            .lock()
            .unwrap()
            .get(&(provider.to_string(), event_id.to_string()))
            .map(|e| e.status())
    }
}

#[async_trait]
impl WebhookEventStore for MemoryWebhookStore {
    async fn claim(
        &self,
        provider: &str,
        event_id: &str,
        event_type: &str,
        payload_json: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Mutex-held check-and-insert mirrors the database's atomic
        // insert-if-absent.
        let mut state = self.inner.lock().unwrap();
        let key = (provider.to_string(), event_id.to_string());
        if state.contains_key(&key) {
            return Ok(false);
        }
        state.insert(
            key,
            WebhookEvent {
                provider: provider.to_string(),
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                status_code: WebhookEventStatus::Processing.as_str().to_string(),
                payload_json: payload_json.to_string(),
                received_at: now,
                processed_at: None,
            },
        );
        Ok(true)
    }

    async fn complete(
        &self,
        provider: &str,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(event) = state.get_mut(&(provider.to_string(), event_id.to_string())) {
            event.status_code = WebhookEventStatus::Completed.as_str().to_string();
            event.processed_at = Some(now);
        }
        Ok(())
    }

    async fn release(&self, provider: &str, event_id: &str) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        let key = (provider.to_string(), event_id.to_string());
        if state
            .get(&key)
            .map(|e| e.status_code == WebhookEventStatus::Processing.as_str())
            .unwrap_or(false)
        {
            state.remove(&key);
        }
        Ok(())
    }
}
