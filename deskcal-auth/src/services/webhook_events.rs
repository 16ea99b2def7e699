//! At-most-once webhook processing keyed on (provider, event id).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskcal_core::error::AppError;
use std::sync::Arc;

/// Storage primitive behind the idempotency guard. `claim` must be an
/// atomic insert-if-absent so concurrent deliveries of the same event
/// elect exactly one winner.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Returns true when this call inserted the row (caller owns the
    /// event), false when a row already existed in any state.
    async fn claim(
        &self,
        provider: &str,
        event_id: &str,
        event_type: &str,
        payload_json: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn complete(
        &self,
        provider: &str,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Deletes the row only while it is still PROCESSING; completed
    /// events stay recorded forever.
    async fn release(&self, provider: &str, event_id: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct WebhookGuardService {
    store: Arc<dyn WebhookEventStore>,
}

impl WebhookGuardService {
    pub fn new(store: Arc<dyn WebhookEventStore>) -> Self {
        Self { store }
    }

    /// Try to take ownership of an event. Duplicates (already claimed
    /// or already completed) come back false and must be acknowledged
    /// upstream without reprocessing.
    pub async fn try_claim(
        &self,
        provider: &str,
        event_id: &str,
        event_type: &str,
        payload_json: &str,
    ) -> Result<bool, AppError> {
        self.store
            .claim(provider, event_id, event_type, payload_json, Utc::now())
            .await
    }

    pub async fn mark_completed(&self, provider: &str, event_id: &str) -> Result<(), AppError> {
        self.store.complete(provider, event_id, Utc::now()).await
    }

    /// Give the event back after a processing failure so the provider's
    /// retry can claim it again.
    pub async fn release(&self, provider: &str, event_id: &str) -> Result<(), AppError> {
        self.store.release(provider, event_id).await
    }
}
