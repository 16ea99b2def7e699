//! Inbound PayPal webhook endpoint.
//!
//! Order of checks: authenticity first, then the idempotency claim,
//! then processing. A duplicate delivery is acknowledged with 200 so
//! PayPal stops retrying; a processing failure releases the claim and
//! returns non-2xx so the retry can run the work again.

use axum::{extract::State, http::HeaderMap, Json};
use deskcal_core::error::AppError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::services::TransmissionHeaders;
use crate::AppState;

const PROVIDER: &str = "paypal";

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    id: String,
    event_type: String,
}

/// POST /webhooks/paypal
///
/// Takes the raw body because the signature covers the exact bytes
/// PayPal sent.
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let transmission = TransmissionHeaders::from_headers(&headers)?;
    let verified = state.paypal.verify(&transmission, &body).await?;
    if !verified {
        tracing::warn!(
            transmission_id = %transmission.transmission_id,
            "Webhook signature verification failed"
        );
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "webhook signature could not be verified"
        )));
    }

    let envelope: WebhookEnvelope = serde_json::from_str(&body)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("webhook body is not valid JSON")))?;

    let claimed = state
        .webhook_guard
        .try_claim(PROVIDER, &envelope.id, &envelope.event_type, &body)
        .await?;
    if !claimed {
        tracing::info!(event_id = %envelope.id, "Duplicate webhook delivery acknowledged");
        return Ok(Json(json!({ "status": "duplicate" })));
    }

    if let Err(e) = process_event(&envelope).await {
        // Give the claim back so PayPal's retry can reprocess.
        state.webhook_guard.release(PROVIDER, &envelope.id).await?;
        tracing::error!(event_id = %envelope.id, error = %e, "Webhook processing failed");
        return Err(AppError::InternalError(e));
    }

    state
        .webhook_guard
        .mark_completed(PROVIDER, &envelope.id)
        .await?;
    tracing::info!(
        event_id = %envelope.id,
        event_type = %envelope.event_type,
        "Webhook processed"
    );
    Ok(Json(json!({ "status": "processed" })))
}

/// Dispatch on event type. Billing state changes live in the payments
/// module; the events this service cares about are logged and recorded
/// so the dedup table stays authoritative.
async fn process_event(envelope: &WebhookEnvelope) -> Result<(), anyhow::Error> {
    match envelope.event_type.as_str() {
        "PAYMENT.SALE.COMPLETED" | "BILLING.SUBSCRIPTION.ACTIVATED" => {
            tracing::info!(event_id = %envelope.id, event_type = %envelope.event_type, "Payment event accepted");
        }
        "BILLING.SUBSCRIPTION.CANCELLED" | "BILLING.SUBSCRIPTION.EXPIRED" => {
            tracing::info!(event_id = %envelope.id, event_type = %envelope.event_type, "Subscription ended");
        }
        other => {
            tracing::debug!(event_id = %envelope.id, event_type = %other, "Unhandled webhook event type");
        }
    }
    Ok(())
}
