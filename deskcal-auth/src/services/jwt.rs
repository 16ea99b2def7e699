use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;

/// JWT service for session credential issuance and verification.
///
/// One HS256 secret signs both kinds of session credential. Verification
/// fails closed: expired, malformed and forged all collapse to `None` so
/// no oracle is exposed to callers.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Which credential a token is. An access token is never accepted where
/// a refresh token is required, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Security domain a credential belongs to. Admin console ids and
/// member ids come from independent sequences, so an admin credential
/// must never verify as a member session (or vice versa) no matter
/// what its subject happens to collide with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRealm {
    Member,
    Admin,
}

/// Claim set embedded in every session credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (member id).
    pub sub: String,
    pub nickname: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub kind: TokenKind,
    pub realm: TokenRealm,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
}

impl SessionClaims {
    pub fn member_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Identity fields a credential is issued for.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub member_id: i64,
    pub nickname: String,
    pub provider: String,
    pub email: Option<String>,
}

/// Token pair returned to clients.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        }
    }

    /// Issue a short-lived member access token.
    pub fn issue_access(&self, identity: &SessionIdentity) -> Result<String, anyhow::Error> {
        self.issue(
            identity,
            TokenKind::Access,
            TokenRealm::Member,
            Duration::minutes(self.access_token_expiry_minutes),
        )
    }

    /// Issue a long-lived member refresh token.
    pub fn issue_refresh(&self, identity: &SessionIdentity) -> Result<String, anyhow::Error> {
        self.issue(
            identity,
            TokenKind::Refresh,
            TokenRealm::Member,
            Duration::days(self.refresh_token_expiry_days),
        )
    }

    fn issue(
        &self,
        identity: &SessionIdentity,
        kind: TokenKind,
        realm: TokenRealm,
        ttl: Duration,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: identity.member_id.to_string(),
            nickname: identity.nickname.clone(),
            provider: identity.provider.clone(),
            email: identity.email.clone(),
            kind,
            realm,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode {:?} token: {}", kind, e))
    }

    /// Issue both tokens for one member identity.
    pub fn issue_pair(&self, identity: &SessionIdentity) -> Result<TokenPair, anyhow::Error> {
        Ok(TokenPair {
            access_token: self.issue_access(identity)?,
            refresh_token: self.issue_refresh(identity)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_seconds(),
        })
    }

    /// Issue both tokens for an admin console identity. Admin credentials
    /// carry their own realm claim and are rejected by every member-facing
    /// verification path.
    pub fn issue_admin_pair(&self, identity: &SessionIdentity) -> Result<TokenPair, anyhow::Error> {
        Ok(TokenPair {
            access_token: self.issue(
                identity,
                TokenKind::Access,
                TokenRealm::Admin,
                Duration::minutes(self.access_token_expiry_minutes),
            )?,
            refresh_token: self.issue(
                identity,
                TokenKind::Refresh,
                TokenRealm::Admin,
                Duration::days(self.refresh_token_expiry_days),
            )?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_seconds(),
        })
    }

    /// Verify signature and expiry. Any failure is `None`; callers treat
    /// that as "unauthenticated" and never retried.
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }

    /// Verify a member access token: `kind = access`, `realm = member`.
    pub fn verify_access(&self, token: &str) -> Option<SessionClaims> {
        self.verify(token)
            .filter(|claims| claims.kind == TokenKind::Access && claims.realm == TokenRealm::Member)
    }

    /// Verify a member refresh token: `kind = refresh`, `realm = member`.
    pub fn verify_refresh(&self, token: &str) -> Option<SessionClaims> {
        self.verify(token)
            .filter(|claims| claims.kind == TokenKind::Refresh && claims.realm == TokenRealm::Member)
    }

    /// Verify an admin access token: `kind = access`, `realm = admin`.
    pub fn verify_admin_access(&self, token: &str) -> Option<SessionClaims> {
        self.verify(token)
            .filter(|claims| claims.kind == TokenKind::Access && claims.realm == TokenRealm::Admin)
    }

    /// Access token expiry in seconds (for client info).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}
