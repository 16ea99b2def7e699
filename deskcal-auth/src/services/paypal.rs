//! PayPal webhook signature verification.
//!
//! Authenticity is delegated to PayPal's verify-webhook-signature API
//! rather than verifying the certificate chain locally; the trade-off
//! is one extra round trip per delivery.

use async_trait::async_trait;
use axum::http::HeaderMap;
use deskcal_core::error::AppError;
use serde::Deserialize;
use serde_json::json;

use crate::config::PaypalConfig;

/// Transmission headers PayPal attaches to every webhook delivery.
#[derive(Debug, Clone)]
pub struct TransmissionHeaders {
    pub transmission_id: String,
    pub transmission_time: String,
    pub transmission_sig: String,
    pub cert_url: String,
    pub auth_algo: String,
}

impl TransmissionHeaders {
    /// Missing headers mean the request cannot have come from PayPal.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let get = |name: &str| -> Result<String, AppError> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
                .ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!("missing webhook header: {}", name))
                })
        };
        Ok(Self {
            transmission_id: get("paypal-transmission-id")?,
            transmission_time: get("paypal-transmission-time")?,
            transmission_sig: get("paypal-transmission-sig")?,
            cert_url: get("paypal-cert-url")?,
            auth_algo: get("paypal-auth-algo")?,
        })
    }
}

/// Signature check on an inbound webhook delivery.
#[async_trait]
pub trait WebhookVerifier: Send + Sync {
    async fn verify(
        &self,
        headers: &TransmissionHeaders,
        raw_body: &str,
    ) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct PaypalVerifier {
    client: reqwest::Client,
    api_base_url: String,
    client_id: String,
    client_secret: String,
    webhook_id: String,
}

impl PaypalVerifier {
    pub fn new(config: &PaypalConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base_url: config.mode.api_base_url().to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            webhook_id: config.webhook_id.clone(),
        }
    }

    async fn access_token(&self) -> Result<String, AppError> {
        let res = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "PayPal token request failed");
                AppError::BadGateway("payment provider unavailable".to_string())
            })?;

        if !res.status().is_success() {
            let status = res.status();
            tracing::error!(status = %status, "PayPal token request rejected");
            return Err(AppError::BadGateway(
                "payment provider rejected credentials".to_string(),
            ));
        }

        let token: PaypalTokenResponse = res.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse PayPal token response");
            AppError::BadGateway("payment provider returned malformed response".to_string())
        })?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl WebhookVerifier for PaypalVerifier {
    async fn verify(
        &self,
        headers: &TransmissionHeaders,
        raw_body: &str,
    ) -> Result<bool, AppError> {
        let webhook_event: serde_json::Value = serde_json::from_str(raw_body)
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("webhook body is not valid JSON")))?;

        let token = self.access_token().await?;
        let res = self
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.api_base_url
            ))
            .bearer_auth(token)
            .json(&json!({
                "transmission_id": headers.transmission_id,
                "transmission_time": headers.transmission_time,
                "transmission_sig": headers.transmission_sig,
                "cert_url": headers.cert_url,
                "auth_algo": headers.auth_algo,
                "webhook_id": self.webhook_id,
                "webhook_event": webhook_event,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "PayPal signature verification request failed");
                AppError::BadGateway("payment provider unavailable".to_string())
            })?;

        if !res.status().is_success() {
            let status = res.status();
            tracing::error!(status = %status, "PayPal signature verification rejected");
            return Err(AppError::BadGateway(
                "payment provider could not verify signature".to_string(),
            ));
        }

        let body: VerifySignatureResponse = res.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse PayPal verification response");
            AppError::BadGateway("payment provider returned malformed response".to_string())
        })?;
        Ok(body.verification_status == "SUCCESS")
    }
}

#[derive(Deserialize)]
struct PaypalTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct VerifySignatureResponse {
    verification_status: String,
}
