// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Audio Store API Server
//!
//! Stores user audio uploads behind Yandex ID login.

use audio_store::{
    config::{Config, LogFormat},
    db::{Database, PgDatabase},
    services::YandexClient,
    AppState,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration errors are fatal; the orchestrator restarts us.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging(LogFormat::Json);
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.app.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.app.port,
        environment = %config.app.environment,
        "Starting Audio Store API"
    );

    // Wait for PostgreSQL, then make sure the schema exists
    let db = PgDatabase::connect_with_retry(&config.database).await?;
    db.create_tables().await?;

    let identity = YandexClient::new(config.oauth.clone())?;
    let state = AppState::new(config.clone(), Arc::new(db), Arc::new(identity))?;
    state.storage.init().await?;

    if config.app.docs_enabled {
        tracing::info!("API docs available at /docs");
    }

    // Build router
    let app = audio_store::routes::create_router(Arc::new(state));

    // Start server
    let addr = format!("0.0.0.0:{}", config.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured logging.
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("audio_store=debug,info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true)
                    .flatten_event(true),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}
