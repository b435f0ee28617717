//! form-relay server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use form_relay::api;
use form_relay::app_state::AppState;
use form_relay::config::{LogFormat, RelayConfig, ReviewMode};
use form_relay::domain::{ContentPolicy, ManualReview, ReviewPolicy, SessionRegistry};
use form_relay::persistence::{MemoryStore, PostgresStore, SubmissionStore};
use form_relay::service::{DeliverySettings, RelayService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = RelayConfig::from_env().context("invalid LISTEN_ADDR")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting form-relay");

    // Build persistence layer; an unreachable database aborts startup
    let store: Arc<dyn SubmissionStore> = if config.persistence_enabled {
        Arc::new(
            PostgresStore::connect(&config)
                .await
                .context("failed to initialize postgres persistence")?,
        )
    } else {
        tracing::warn!("persistence disabled; submissions are kept in memory only");
        Arc::new(MemoryStore::new())
    };

    // Build review policy
    let policy: Arc<dyn ReviewPolicy> = match config.review_mode {
        ReviewMode::Auto => Arc::new(ContentPolicy::new(
            config.min_message_len,
            config.blocked_keywords.clone(),
        )),
        ReviewMode::Manual => Arc::new(ManualReview),
    };
    tracing::info!(mode = ?config.review_mode, "review policy configured");

    // Build service layer
    let relay_service = Arc::new(RelayService::new(
        Arc::new(SessionRegistry::new()),
        store,
        policy,
        DeliverySettings::from(&config),
    ));

    // Build router
    let app = api::build_app(AppState { relay_service });

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
