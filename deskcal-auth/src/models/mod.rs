pub mod admin;
pub mod export;
pub mod login_attempt;
pub mod member;
pub mod task;
pub mod webhook_event;

pub use admin::AdminAccount;
pub use export::{ExportState, ExportVisibility, TaskExport};
pub use login_attempt::LoginAttempt;
pub use member::Member;
pub use task::{OwnerKind, Task, Workspace};
pub use webhook_event::{WebhookEvent, WebhookEventStatus};
