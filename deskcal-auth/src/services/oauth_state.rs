//! OAuth federation state tokens.
//!
//! The handshake has two independent halves, kept in separate types on
//! purpose:
//! - a stateless signed state token proving the parameters of the flow
//!   (provider, validated deep-link callback, nonce hash), and
//! - an httpOnly cookie holding the raw nonce, scoped to the
//!   provider's callback path, proving the redemption happens in the
//!   same client context that initiated the flow (double submit).
//!
//! A captured state parameter alone is therefore not replayable.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use deskcal_core::error::AppError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use url::Url;

use crate::config::OauthConfig;

const STATE_TOKEN_TYPE: &str = "oauth_state";
const STATE_COOKIE_PREFIX: &str = "oauth_state_";
const NONCE_BYTES: usize = 24;

/// Identity providers the federation flow supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OauthProvider {
    Google,
    Kakao,
}

impl OauthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OauthProvider::Google => "google",
            OauthProvider::Kakao => "kakao",
        }
    }

    /// Cookie name is deterministic per provider so concurrent flows
    /// against different providers do not clobber each other.
    pub fn state_cookie_name(&self) -> String {
        format!("{}{}", STATE_COOKIE_PREFIX, self.as_str())
    }

    /// The cookie is path scoped to this provider's callback route.
    pub fn callback_path(&self) -> String {
        format!("/auth/{}/callback", self.as_str())
    }
}

impl std::str::FromStr for OauthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(OauthProvider::Google),
            "kakao" => Ok(OauthProvider::Kakao),
            _ => Err(format!("Unknown OAuth provider: {}", s)),
        }
    }
}

/// Reduce a client-supplied callback to the exact `scheme://host/path`
/// shape the allow-list stores. HTTP(S) URLs are not client deep links
/// and are rejected outright, as is anything carrying credentials.
pub fn normalize_callback(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;

    match parsed.scheme() {
        "http" | "https" => return None,
        _ => {}
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return None;
    }

    let host = parsed.host_str()?;
    let normalized = match parsed.port() {
        Some(port) => format!("{}://{}:{}{}", parsed.scheme(), host, port, parsed.path()),
        None => format!("{}://{}{}", parsed.scheme(), host, parsed.path()),
    };
    Some(normalized)
}

/// Static set of deep-link origins a state token may carry, built once
/// from configuration. Comparison is exact normalized-string match.
#[derive(Debug, Clone)]
pub struct CallbackAllowlist {
    allowed: HashSet<String>,
}

impl CallbackAllowlist {
    pub fn new(entries: &[String]) -> Self {
        let allowed = entries
            .iter()
            .filter_map(|raw| normalize_callback(raw.trim()))
            .collect();
        Self { allowed }
    }

    pub fn is_allowed(&self, raw: &str) -> bool {
        match normalize_callback(raw) {
            Some(normalized) => self.allowed.contains(&normalized),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

/// Signed state token payload.
#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    #[serde(rename = "type")]
    token_type: String,
    provider: OauthProvider,
    callback: String,
    #[serde(rename = "nonceHash")]
    nonce_hash: String,
    exp: i64,
    iat: i64,
}

/// Result of state issuance. The caller sets `cookie_nonce` as an
/// httpOnly cookie on the provider's callback path with maxAge equal
/// to the state TTL.
#[derive(Debug)]
pub struct StateIssue {
    pub state: String,
    pub cookie_nonce: String,
}

#[derive(Clone)]
pub struct OauthStateService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
    allowlist: CallbackAllowlist,
}

impl OauthStateService {
    pub fn new(secret: &str, config: &OauthConfig) -> Self {
        let allowlist = CallbackAllowlist::new(&config.callback_allowlist);
        if allowlist.is_empty() {
            tracing::warn!("OAuth callback allow-list is empty, every sign-in will be refused");
        }
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds: config.state_ttl_seconds,
            allowlist,
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    pub fn is_allowed_callback(&self, raw: &str) -> bool {
        self.allowlist.is_allowed(raw)
    }

    /// Validate the callback against the allow-list, then sign a state
    /// token for it. The order matters: signing an unvalidated callback
    /// would turn the callback redirect into an open redirect.
    pub fn create_state(
        &self,
        provider: OauthProvider,
        callback: &str,
    ) -> Result<StateIssue, AppError> {
        let normalized = normalize_callback(callback)
            .filter(|n| self.allowlist.is_allowed(n))
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid OAuth callback")))?;

        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let cookie_nonce = URL_SAFE_NO_PAD.encode(nonce_bytes);

        let now = Utc::now();
        let claims = StateClaims {
            token_type: STATE_TOKEN_TYPE.to_string(),
            provider,
            callback: normalized,
            nonce_hash: hash_nonce(&cookie_nonce),
            exp: now.timestamp() + self.ttl_seconds,
            iat: now.timestamp(),
        };

        let state = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to sign state: {}", e)))?;

        Ok(StateIssue {
            state,
            cookie_nonce,
        })
    }

    /// Verify a state token against the provider being redeemed and the
    /// paired cookie nonce. Returns the trusted, pre-validated callback
    /// or `None`; forged, expired, replayed and mismatched all look the
    /// same to the caller.
    pub fn verify_state(
        &self,
        provider: OauthProvider,
        state: Option<&str>,
        cookie_nonce: Option<&str>,
    ) -> Option<String> {
        let state = state?;
        let cookie_nonce = cookie_nonce?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let claims = decode::<StateClaims>(state, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()?;

        if claims.token_type != STATE_TOKEN_TYPE {
            return None;
        }
        if claims.provider != provider {
            return None;
        }
        // The allow-list may have shrunk since issuance.
        if !self.allowlist.is_allowed(&claims.callback) {
            return None;
        }

        let presented = hash_nonce(cookie_nonce);
        if !bool::from(presented.as_bytes().ct_eq(claims.nonce_hash.as_bytes())) {
            return None;
        }

        Some(claims.callback)
    }
}

fn hash_nonce(nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OauthConfig, ProviderCredentials};

    fn test_config() -> OauthConfig {
        OauthConfig {
            callback_allowlist: vec![
                "deskcal://auth/callback".to_string(),
                "deskcal-dev://auth/callback".to_string(),
            ],
            state_ttl_seconds: 600,
            public_base_url: "http://localhost:8080".to_string(),
            google: ProviderCredentials {
                client_id: "g".to_string(),
                client_secret: "gs".to_string(),
            },
            kakao: ProviderCredentials {
                client_id: "k".to_string(),
                client_secret: "ks".to_string(),
            },
        }
    }

    fn test_service() -> OauthStateService {
        OauthStateService::new("state-test-secret", &test_config())
    }

    #[test]
    fn normalize_strips_query_and_fragment() {
        assert_eq!(
            normalize_callback("deskcal://auth/callback?foo=1#frag").as_deref(),
            Some("deskcal://auth/callback")
        );
    }

    #[test]
    fn normalize_rejects_http_schemes_and_credentials() {
        assert_eq!(normalize_callback("https://evil.example/cb"), None);
        assert_eq!(normalize_callback("http://localhost/cb"), None);
        assert_eq!(normalize_callback("deskcal://user:pw@auth/callback"), None);
        assert_eq!(normalize_callback("not a url"), None);
    }

    #[test]
    fn allowlist_matches_exactly() {
        let list = CallbackAllowlist::new(&[
            "deskcal://auth/callback".to_string(),
            "myapp://auth/callback".to_string(),
        ]);

        assert!(list.is_allowed("deskcal://auth/callback"));
        // Query noise is stripped before comparison.
        assert!(list.is_allowed("deskcal://auth/callback?x=1"));
        assert!(!list.is_allowed("deskcal://auth/callback/extra"));
        assert!(!list.is_allowed("deskcal://other/callback"));
        assert!(!list.is_allowed("evil://auth/callback"));
        assert!(!list.is_allowed("https://auth/callback"));
    }

    #[test]
    fn state_round_trip_with_matching_cookie() {
        let service = test_service();
        let issue = service
            .create_state(OauthProvider::Kakao, "deskcal://auth/callback")
            .unwrap();

        // 24 random bytes, base64url: at least 32 chars of entropy.
        assert!(issue.cookie_nonce.len() >= 32);

        let callback = service.verify_state(
            OauthProvider::Kakao,
            Some(&issue.state),
            Some(&issue.cookie_nonce),
        );
        assert_eq!(callback.as_deref(), Some("deskcal://auth/callback"));
    }

    #[test]
    fn wrong_provider_fails() {
        let service = test_service();
        let issue = service
            .create_state(OauthProvider::Kakao, "deskcal://auth/callback")
            .unwrap();

        assert!(service
            .verify_state(
                OauthProvider::Google,
                Some(&issue.state),
                Some(&issue.cookie_nonce)
            )
            .is_none());
    }

    #[test]
    fn missing_or_mismatched_cookie_fails() {
        let service = test_service();
        let issue = service
            .create_state(OauthProvider::Google, "deskcal://auth/callback")
            .unwrap();

        assert!(service
            .verify_state(OauthProvider::Google, Some(&issue.state), None)
            .is_none());
        assert!(service
            .verify_state(
                OauthProvider::Google,
                Some(&issue.state),
                Some("someone-elses-nonce")
            )
            .is_none());
    }

    #[test]
    fn unlisted_callback_is_refused_before_signing() {
        let service = test_service();
        assert!(service
            .create_state(OauthProvider::Kakao, "evil://auth/callback")
            .is_err());
        assert!(service
            .create_state(OauthProvider::Kakao, "https://evil.example/cb")
            .is_err());
    }

    #[test]
    fn tampered_state_fails() {
        let service = test_service();
        let issue = service
            .create_state(OauthProvider::Kakao, "deskcal://auth/callback")
            .unwrap();

        let mut tampered = issue.state.clone();
        tampered.push('x');
        assert!(service
            .verify_state(
                OauthProvider::Kakao,
                Some(&tampered),
                Some(&issue.cookie_nonce)
            )
            .is_none());

        let other = OauthStateService::new("another-secret", &test_config());
        let forged = other
            .create_state(OauthProvider::Kakao, "deskcal://auth/callback")
            .unwrap();
        assert!(service
            .verify_state(
                OauthProvider::Kakao,
                Some(&forged.state),
                Some(&forged.cookie_nonce)
            )
            .is_none());
    }
}
