//! causegraph API Server
//!
//! REST and SSE server for causal graph jobs, with the worker pool that
//! runs them.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use causegraph_api::{create_router, state::AppState};
use causegraph_core::config::AppConfig;
use causegraph_jobs::WorkerPool;
use std::sync::Arc;

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("CAUSEGRAPH_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "causegraph_api=debug,causegraph_jobs={},tower_http=debug",
            config.logging.level
        )
        .into()
    });

    if config.logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_config().context("invalid configuration")?;
    init_tracing(&config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let pool_size = config.worker.pool_size;

    // Create application state
    let state = Arc::new(AppState::from_config(config)?);
    let pool = WorkerPool::spawn(Arc::clone(&state.service), pool_size);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("causegraph API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;

    Ok(())
}
