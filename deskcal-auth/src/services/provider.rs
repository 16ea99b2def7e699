//! Outbound calls to the identity providers (Google, Kakao).
//!
//! Provider outages surface as 502 Bad Gateway, distinct from the 401s
//! the verification layer emits for bad credentials.

use async_trait::async_trait;
use deskcal_core::error::AppError;
use serde::Deserialize;

use crate::config::{OauthConfig, ProviderCredentials};
use crate::services::oauth_state::OauthProvider;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const KAKAO_AUTH_URL: &str = "https://kauth.kakao.com/oauth/authorize";
const KAKAO_TOKEN_URL: &str = "https://kauth.kakao.com/oauth/token";
const KAKAO_USERINFO_URL: &str = "https://kapi.kakao.com/v2/user/me";

/// Normalized identity returned by every provider.
#[derive(Debug, Clone)]
pub struct OAuthUserInfo {
    pub provider_id: String,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
}

/// Redirect construction and code-for-identity exchange.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider authorization URL the client is redirected to. `state`
    /// comes back verbatim on the callback.
    fn authorization_url(
        &self,
        provider: OauthProvider,
        redirect_uri: &str,
        state: &str,
    ) -> String;

    async fn exchange_code(
        &self,
        provider: OauthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthUserInfo, AppError>;
}

#[derive(Clone)]
pub struct HttpProviderClient {
    client: reqwest::Client,
    google: ProviderCredentials,
    kakao: ProviderCredentials,
}

impl HttpProviderClient {
    pub fn new(config: &OauthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            google: config.google.clone(),
            kakao: config.kakao.clone(),
        }
    }

    async fn fetch_token(
        &self,
        provider: OauthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        let (token_url, creds) = match provider {
            OauthProvider::Google => (GOOGLE_TOKEN_URL, &self.google),
            OauthProvider::Kakao => (KAKAO_TOKEN_URL, &self.kakao),
        };

        let token_res = self
            .client
            .post(token_url)
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = provider.as_str(), error = %e, "Token exchange request failed");
                AppError::BadGateway("identity provider unavailable".to_string())
            })?;

        if !token_res.status().is_success() {
            let status = token_res.status();
            let err_body = token_res.text().await.unwrap_or_default();
            tracing::error!(provider = provider.as_str(), status = %status, body = %err_body, "Token exchange rejected");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "authorization code was not accepted"
            )));
        }

        let token_data: TokenResponse = token_res.json().await.map_err(|e| {
            tracing::error!(provider = provider.as_str(), error = %e, "Failed to parse token response");
            AppError::BadGateway("identity provider returned malformed response".to_string())
        })?;
        Ok(token_data.access_token)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn authorization_url(
        &self,
        provider: OauthProvider,
        redirect_uri: &str,
        state: &str,
    ) -> String {
        match provider {
            OauthProvider::Google => format!(
                "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
                GOOGLE_AUTH_URL,
                urlencoding::encode(&self.google.client_id),
                urlencoding::encode(redirect_uri),
                urlencoding::encode("openid email profile"),
                urlencoding::encode(state),
            ),
            OauthProvider::Kakao => format!(
                "{}?client_id={}&redirect_uri={}&response_type=code&state={}",
                KAKAO_AUTH_URL,
                urlencoding::encode(&self.kakao.client_id),
                urlencoding::encode(redirect_uri),
                urlencoding::encode(state),
            ),
        }
    }

    async fn exchange_code(
        &self,
        provider: OauthProvider,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthUserInfo, AppError> {
        let access_token = self.fetch_token(provider, code, redirect_uri).await?;

        match provider {
            OauthProvider::Google => {
                let res = self
                    .client
                    .get(GOOGLE_USERINFO_URL)
                    .bearer_auth(access_token)
                    .send()
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to fetch Google user info");
                        AppError::BadGateway("identity provider unavailable".to_string())
                    })?;
                let info: GoogleUserInfo = res.json().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to parse Google user info");
                    AppError::BadGateway(
                        "identity provider returned malformed response".to_string(),
                    )
                })?;
                Ok(OAuthUserInfo {
                    provider_id: info.id,
                    email: info.email,
                    nickname: info.name,
                    profile_image_url: info.picture,
                })
            }
            OauthProvider::Kakao => {
                let res = self
                    .client
                    .get(KAKAO_USERINFO_URL)
                    .bearer_auth(access_token)
                    .send()
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to fetch Kakao user info");
                        AppError::BadGateway("identity provider unavailable".to_string())
                    })?;
                let info: KakaoUserInfo = res.json().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to parse Kakao user info");
                    AppError::BadGateway(
                        "identity provider returned malformed response".to_string(),
                    )
                })?;
                let account = info.kakao_account.unwrap_or_default();
                let profile = account.profile.unwrap_or_default();
                Ok(OAuthUserInfo {
                    provider_id: info.id.to_string(),
                    email: account.email,
                    nickname: profile.nickname,
                    profile_image_url: profile.profile_image_url,
                })
            }
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Deserialize)]
struct KakaoUserInfo {
    id: i64,
    kakao_account: Option<KakaoAccount>,
}

#[derive(Deserialize, Default)]
struct KakaoAccount {
    email: Option<String>,
    profile: Option<KakaoProfile>,
}

#[derive(Deserialize, Default)]
struct KakaoProfile {
    nickname: Option<String>,
    profile_image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpProviderClient {
        HttpProviderClient {
            client: reqwest::Client::new(),
            google: ProviderCredentials {
                client_id: "google-id".to_string(),
                client_secret: "google-secret".to_string(),
            },
            kakao: ProviderCredentials {
                client_id: "kakao-id".to_string(),
                client_secret: "kakao-secret".to_string(),
            },
        }
    }

    #[test]
    fn google_authorization_url_carries_state_and_redirect() {
        let url = client().authorization_url(
            OauthProvider::Google,
            "https://api.example.com/auth/google/callback",
            "signed-state",
        );
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=google-id"));
        assert!(url.contains("state=signed-state"));
        assert!(url.contains(&urlencoding::encode("https://api.example.com/auth/google/callback").into_owned()));
    }

    #[test]
    fn kakao_authorization_url_omits_scope() {
        let url = client().authorization_url(
            OauthProvider::Kakao,
            "https://api.example.com/auth/kakao/callback",
            "s",
        );
        assert!(url.starts_with(KAKAO_AUTH_URL));
        assert!(!url.contains("scope="));
    }
}
