use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    services::{
        Database, EmailNotifier, IdentityService, IdentitySettings, JwtService, MemoryStore,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::{create_ip_rate_limiter, create_keyed_rate_limiter};
use service_core::observability::logging::init_tracing;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    identity_service::services::metrics::init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let jwt = JwtService::new(&config.jwt)?;
    tracing::info!("JWT service initialized");

    let notifier = Arc::new(EmailNotifier::new(&config.smtp)?);
    tracing::info!(host = %config.smtp.host, "Email notifier initialized");

    let settings = IdentitySettings::from_config(&config);

    let identity = if config.database.url.is_some() {
        let pool = db::create_pool(&config.database).await?;
        db::run_migrations(&pool).await?;
        IdentityService::new(Arc::new(Database::new(pool)), jwt, notifier, settings)
    } else {
        // Only reachable outside prod; validation requires DATABASE_URL there
        tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
        IdentityService::new(Arc::new(MemoryStore::new()), jwt, notifier, settings)
    };

    identity
        .rbac()
        .ensure_catalog()
        .await
        .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;
    tracing::info!("Role catalog ensured");

    if let Some(email) = config.admin.bootstrap_super_admin_email.as_deref() {
        identity
            .bootstrap_super_admin(email)
            .await
            .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;
    }

    let otp_send_limiter = create_keyed_rate_limiter(
        config.rate_limit.otp_send_attempts,
        config.rate_limit.otp_send_window_seconds,
    );
    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: OTP send, Login and Global IP");

    let addr = config.common.bind_addr()?;

    let state = AppState {
        config: config.clone(),
        identity,
        otp_send_limiter,
        login_rate_limiter,
        ip_rate_limiter,
    };
    let app = build_router(state);

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
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
