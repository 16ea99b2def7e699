pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use deskcal_core::axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Json, Router,
};
use deskcal_core::error::AppError;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AuthConfig;
use crate::services::{
    AccessService, Database, LoginGuardService, OauthStateService, ProviderClient, WebhookGuardService,
    WebhookVerifier,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub db: Database,
    pub access: AccessService,
    pub oauth_state: OauthStateService,
    pub login_guard: LoginGuardService,
    pub webhook_guard: WebhookGuardService,
    pub providers: Arc<dyn ProviderClient>,
    pub paypal: Arc<dyn WebhookVerifier>,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let session_routes = Router::new()
        .route("/auth/me", get(handlers::session::me))
        .route("/auth/logout", post(handlers::session::logout))
        .route(
            "/tasks/:task_id/exports",
            post(handlers::exports::create_export).get(handlers::exports::list_exports),
        )
        .route(
            "/exports/:export_id",
            patch(handlers::exports::update_export).delete(handlers::exports::revoke_export),
        )
        .route(
            "/exports/:export_id/members",
            post(handlers::exports::add_export_member),
        )
        .route(
            "/exports/:export_id/members/:member_id",
            delete(handlers::exports::remove_export_member),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/auth/:provider/start", get(handlers::oauth::start))
        .route("/auth/:provider/callback", get(handlers::oauth::callback))
        .route("/auth/refresh", post(handlers::session::refresh))
        .route(
            "/exports/shared/:token",
            get(handlers::exports::consume_export),
        )
        .route("/admin/login", post(handlers::admin::login))
        .route("/admin/me", get(handlers::admin::me))
        .route("/admin/logout", post(handlers::admin::logout))
        .route("/webhooks/paypal", post(handlers::webhook::paypal_webhook))
        .merge(session_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|o| match o.parse::<HeaderValue>() {
                            Ok(value) => Some(value),
                            Err(e) => {
                                tracing::error!("Invalid CORS origin '{}': {}", o, e);
                                None
                            }
                        })
                        .collect::<Vec<HeaderValue>>(),
                )
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                .allow_credentials(true),
        );

    Ok(app)
}

/// Service health check.
pub async fn health_check(
    deskcal_core::axum::extract::State(state): deskcal_core::axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
