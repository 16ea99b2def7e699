//! OAuth sign-in: start and callback legs for every federated
//! provider. The callback always lands on this service; the app is
//! reached again only through its pre-validated deep-link callback.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use deskcal_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::services::{OauthProvider, SessionIdentity};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub callback: String,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub auth_url: String,
    pub redirect_uri: String,
}

fn parse_provider(raw: &str) -> Result<OauthProvider, AppError> {
    raw.parse::<OauthProvider>()
        .map_err(|_| AppError::NotFound(anyhow::anyhow!("Unknown provider: {}", raw)))
}

fn redirect_uri(state: &AppState, provider: OauthProvider) -> String {
    format!(
        "{}{}",
        state.config.oauth.public_base_url.trim_end_matches('/'),
        provider.callback_path()
    )
}

/// GET /auth/:provider/start?callback=...
///
/// Issues a signed state token bound to the requested deep-link
/// callback and hands the client the provider authorization URL. The
/// nonce cookie is scoped to the callback path so it is only sent back
/// on the matching callback leg.
pub async fn start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(query): Query<StartQuery>,
) -> Result<(CookieJar, Json<StartResponse>), AppError> {
    let provider = parse_provider(&provider)?;
    let issue = state.oauth_state.create_state(provider, &query.callback)?;

    let redirect_uri = redirect_uri(&state, provider);
    let auth_url = state
        .providers
        .authorization_url(provider, &redirect_uri, &issue.state);

    let jar = jar.add(
        Cookie::build((provider.state_cookie_name(), issue.cookie_nonce))
            .path(provider.callback_path())
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(state.config.is_prod())
            .max_age(time::Duration::seconds(state.oauth_state.ttl_seconds()))
            .build(),
    );

    Ok((
        jar,
        Json(StartResponse {
            auth_url,
            redirect_uri,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /auth/:provider/callback
///
/// Verifies the state token against the paired nonce cookie, exchanges
/// the authorization code, upserts the member, and redirects into the
/// app with a fresh token pair. Once the state has been verified we
/// have a trusted callback to carry errors to; before that, failures
/// are plain HTTP errors.
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(CookieJar, Response), AppError> {
    let provider = parse_provider(&provider)?;

    let cookie_nonce = jar
        .get(&provider.state_cookie_name())
        .map(|c| c.value().to_string());

    // Single use: the nonce cookie is cleared on every outcome.
    let jar = jar.remove(
        Cookie::build(provider.state_cookie_name())
            .path(provider.callback_path())
            .build(),
    );

    let Some(callback) = state.oauth_state.verify_state(
        provider,
        query.state.as_deref(),
        cookie_nonce.as_deref(),
    ) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid or expired OAuth state"
        )));
    };

    if let Some(error) = query.error {
        tracing::warn!(provider = provider.as_str(), error = %error, "Provider returned an error");
        return Ok((jar, error_redirect(&callback, "access_denied")));
    }
    let Some(code) = query.code else {
        return Ok((jar, error_redirect(&callback, "missing_code")));
    };

    let redirect_uri = redirect_uri(&state, provider);
    let user_info = match state
        .providers
        .exchange_code(provider, &code, &redirect_uri)
        .await
    {
        Ok(info) => info,
        Err(e) => {
            tracing::error!(provider = provider.as_str(), error = %e, "Code exchange failed");
            return Ok((jar, error_redirect(&callback, "exchange_failed")));
        }
    };

    let member = state
        .access
        .directory()
        .find_or_create_member(
            provider.as_str(),
            &user_info.provider_id,
            user_info.email.as_deref(),
            user_info.nickname.as_deref(),
            user_info.profile_image_url.as_deref(),
        )
        .await?;

    let identity = SessionIdentity {
        member_id: member.member_id,
        nickname: member.display_name().to_string(),
        provider: member.provider.clone(),
        email: member.email.clone(),
    };
    let pair = state.access.jwt().issue_pair(&identity)?;

    tracing::info!(
        member_id = member.member_id,
        provider = provider.as_str(),
        "Member signed in"
    );

    let target = format!(
        "{}?access_token={}&refresh_token={}",
        callback,
        urlencoding::encode(&pair.access_token),
        urlencoding::encode(&pair.refresh_token),
    );
    Ok((jar, Redirect::to(&target).into_response()))
}

fn error_redirect(callback: &str, code: &str) -> Response {
    Redirect::to(&format!("{}?error={}", callback, code)).into_response()
}
