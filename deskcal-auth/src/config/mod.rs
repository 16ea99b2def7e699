use deskcal_core::config::{self as core_config, get_env};
use deskcal_core::error::AppError;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub oauth: OauthConfig,
    pub lockout: LockoutConfig,
    pub security: SecurityConfig,
    pub paypal: PaypalConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Single shared HS256 signing secret. Also signs OAuth state tokens.
    pub secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OauthConfig {
    /// Raw comma-separated deep-link allow-list; normalized at startup.
    pub callback_allowlist: Vec<String>,
    pub state_ttl_seconds: i64,
    /// Public origin this service is reachable at; provider redirect
    /// URIs are derived from it.
    pub public_base_url: String,
    pub google: ProviderCredentials,
    pub kakao: ProviderCredentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub max_failed_attempts: u32,
    pub window_minutes: i64,
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaypalConfig {
    pub mode: PaypalMode,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PaypalMode {
    Sandbox,
    Live,
}

impl PaypalMode {
    pub fn api_base_url(&self) -> &'static str {
        match self {
            PaypalMode::Sandbox => "https://api-m.sandbox.paypal.com",
            PaypalMode::Live => "https://api-m.paypal.com",
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("deskcal-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
            },
            jwt: JwtConfig {
                // The signing secret never has a fallback, in any environment.
                secret: get_env("AUTH_SECRET", None, true)?,
                access_token_expiry_minutes: parse_env_i64(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "60",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env_i64(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    "7",
                    is_prod,
                )?,
            },
            oauth: OauthConfig {
                callback_allowlist: get_env(
                    "APP_DEEPLINK_ALLOWLIST",
                    Some("deskcal://auth/callback,deskcal-dev://auth/callback"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                state_ttl_seconds: parse_env_i64("OAUTH_STATE_TTL_SECONDS", "600", is_prod)?,
                public_base_url: get_env(
                    "PUBLIC_BASE_URL",
                    Some("http://localhost:8080"),
                    is_prod,
                )?,
                google: ProviderCredentials {
                    client_id: get_env("AUTH_GOOGLE_ID", Some("dev-google-client"), is_prod)?,
                    client_secret: get_env(
                        "AUTH_GOOGLE_SECRET",
                        Some("dev-google-secret"),
                        is_prod,
                    )?,
                },
                kakao: ProviderCredentials {
                    client_id: get_env("AUTH_KAKAO_ID", Some("dev-kakao-client"), is_prod)?,
                    client_secret: get_env("AUTH_KAKAO_SECRET", Some("dev-kakao-secret"), is_prod)?,
                },
            },
            lockout: LockoutConfig {
                max_failed_attempts: get_env("LOGIN_MAX_FAILED_ATTEMPTS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                window_minutes: parse_env_i64("LOGIN_FAIL_WINDOW_MINUTES", "15", is_prod)?,
                lockout_minutes: parse_env_i64("LOGIN_LOCKOUT_MINUTES", "15", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            paypal: PaypalConfig {
                mode: get_env("PAYPAL_MODE", Some("sandbox"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                client_id: get_env("PAYPAL_CLIENT_ID", Some("dev-paypal-client"), is_prod)?,
                client_secret: get_env(
                    "PAYPAL_CLIENT_SECRET",
                    Some("dev-paypal-secret"),
                    is_prod,
                )?,
                webhook_id: get_env("PAYPAL_WEBHOOK_ID", Some("dev-webhook-id"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.oauth.state_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OAUTH_STATE_TTL_SECONDS must be positive"
            )));
        }

        if self.lockout.max_failed_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "LOGIN_MAX_FAILED_ATTEMPTS must be greater than 0"
            )));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn parse_env_i64(key: &str, default: &str, is_prod: bool) -> Result<i64, AppError> {
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: std::num::ParseIntError| {
            AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e))
        })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for PaypalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" => Ok(PaypalMode::Sandbox),
            "live" => Ok(PaypalMode::Live),
            _ => Err(format!("Invalid PayPal mode: {}", s)),
        }
    }
}
