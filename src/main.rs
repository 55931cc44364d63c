//! safeguard-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use safeguard_gateway::app_state::{AppState, RuntimeSettings};
use safeguard_gateway::auth::{JwtTokenService, TokenIssuer};
use safeguard_gateway::config::{LogFormat, SafeguardConfig};
use safeguard_gateway::domain::SessionRegistry;
use safeguard_gateway::notify::{LogNotifier, Notifier, WebhookNotifier};
use safeguard_gateway::persistence::{MemoryStore, PostgresStore, Store};
use safeguard_gateway::service::retention;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = SafeguardConfig::from_env().context("loading configuration")?;

    // Initialize tracing
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting safeguard-gateway");

    // Build persistence and collaborators
    let store = open_store(&config).await?;
    let notifier: Arc<dyn Notifier> = match config.notifier_webhook_url.as_deref() {
        Some(url) => {
            tracing::info!(url, "sending SMS through webhook gateway");
            Arc::new(
                WebhookNotifier::new(url, config.notifier_timeout)
                    .context("building SMS webhook client")?,
            )
        }
        None => {
            tracing::warn!("NOTIFIER_WEBHOOK_URL not set; SMS will only be logged");
            Arc::new(LogNotifier)
        }
    };
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET not set; using the development secret");
    }
    let tokens: Arc<dyn TokenIssuer> = Arc::new(JwtTokenService::new(
        &config.jwt_secret,
        config.token_expiry_days,
    ));

    // Build application state
    let state = AppState::build(store, notifier, tokens, RuntimeSettings::from(&config));

    // Warm the proximity index and keep it bounded
    let retention_window = config.location_retention();
    let warmed = state
        .locations
        .warm_index(retention_window)
        .await
        .context("loading recent locations")?;
    tracing::info!(pings = warmed, "location index warmed");
    tokio::spawn(retention::run(
        state.locations.clone(),
        Arc::clone(state.emergencies.locks()),
        retention_window,
        Duration::from_secs(config.location_prune_interval_secs),
        state.registry.shutdown_signal(),
    ));

    // Build router
    let registry = Arc::clone(&state.registry);
    let app = safeguard_gateway::router(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn open_store(config: &SafeguardConfig) -> anyhow::Result<Arc<dyn Store>> {
    let Some(url) = config.postgres_url() else {
        tracing::warn!("no database configured; using the in-memory store (data is lost on restart)");
        return Ok(Arc::new(MemoryStore::new()));
    };
    let store = PostgresStore::connect(
        url,
        config.database_max_connections,
        config.database_min_connections,
        Duration::from_secs(config.database_connect_timeout_secs),
    )
    .await
    .context("connecting to PostgreSQL")?;
    store.migrate().await.context("running migrations")?;
    tracing::info!("connected to PostgreSQL");
    Ok(Arc::new(store))
}

/// Resolves on Ctrl-C or SIGTERM, after tearing down live connections.
async fn shutdown_signal(registry: Arc<SessionRegistry>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown requested; closing live connections");
    registry.shutdown().await;
}
