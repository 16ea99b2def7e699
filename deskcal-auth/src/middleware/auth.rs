use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::services::SessionClaims;
use crate::AppState;

/// Session cookie written for browser clients after OAuth sign-in.
pub const SESSION_COOKIE: &str = "session_token";
/// Separate cookie for the privileged admin console session.
pub const ADMIN_COOKIE: &str = "admin_token";

pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Require a verified session. The Authorization header wins over the
/// session cookie so API clients that send both get deterministic
/// behavior. Claims land in request extensions for [`AuthUser`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let jar = CookieJar::from_headers(req.headers());
    let session_cookie = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());

    let claims = state
        .access
        .identify(bearer_token(req.headers()), session_cookie.as_deref())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid or expired token".to_string(),
            }),
        ))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Extractor to easily get claims in handlers behind [`auth_middleware`].
pub struct AuthUser(pub SessionClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<SessionClaims>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Auth claims missing from request extensions".to_string(),
            }),
        ))?;

        Ok(AuthUser(claims.clone()))
    }
}
