use std::net::SocketAddr;
use std::sync::Arc;

use deskcal_auth::{
    build_router,
    config::AuthConfig,
    services::{
        AccessService, Database, ExportService, HttpProviderClient, JwtService, LoginGuardService,
        OauthStateService, PaypalVerifier, WebhookGuardService,
    },
    AppState,
};
use deskcal_core::observability::logging::init_tracing;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), deskcal_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting auth service"
    );

    tracing::info!("Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| {
            deskcal_core::error::AppError::DatabaseError(anyhow::anyhow!(
                "Failed to connect to database: {}",
                e
            ))
        })?;
    let db = Database::new(pool);
    db.migrate().await?;
    tracing::info!("Database migrations applied");

    let db_arc = Arc::new(db.clone());

    let jwt = JwtService::new(&config.jwt);
    let oauth_state = OauthStateService::new(&config.jwt.secret, &config.oauth);
    let exports = ExportService::new(db_arc.clone());
    let access = AccessService::new(jwt, db_arc.clone(), exports);
    let login_guard = LoginGuardService::new(db_arc.clone(), &config.lockout);
    let webhook_guard = WebhookGuardService::new(db_arc);
    let providers = Arc::new(HttpProviderClient::new(&config.oauth));
    let paypal = Arc::new(PaypalVerifier::new(&config.paypal));
    tracing::info!("Services initialized");

    let state = AppState {
        config: config.clone(),
        db,
        access,
        oauth_state,
        login_guard,
        webhook_guard,
        providers,
        paypal,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    deskcal_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
