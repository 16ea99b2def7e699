use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventStatus {
    Processing,
    Completed,
}

impl WebhookEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventStatus::Processing => "PROCESSING",
            WebhookEventStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "COMPLETED" => WebhookEventStatus::Completed,
            _ => WebhookEventStatus::Processing,
        }
    }
}

/// Idempotency record for one provider delivery, keyed by
/// (provider, event_id).
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEvent {
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub status_code: String,
    pub payload_json: String,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    pub fn status(&self) -> WebhookEventStatus {
        WebhookEventStatus::parse(&self.status_code)
    }
}
