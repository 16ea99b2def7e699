pub mod access;
pub mod database;
pub mod export;
pub mod jwt;
pub mod login_guard;
pub mod oauth_state;
pub mod paypal;
pub mod provider;
pub mod webhook_events;

pub use access::{AccessService, DirectoryStore};
pub use database::Database;
pub use export::{ExportService, ExportStore};
pub use jwt::{JwtService, SessionClaims, SessionIdentity, TokenKind, TokenPair, TokenRealm};
pub use login_guard::{LoginAttemptStore, LoginGuardService};
pub use oauth_state::{CallbackAllowlist, OauthProvider, OauthStateService};
pub use paypal::{PaypalVerifier, TransmissionHeaders, WebhookVerifier};
pub use provider::{HttpProviderClient, OAuthUserInfo, ProviderClient};
pub use webhook_events::{WebhookEventStore, WebhookGuardService};
