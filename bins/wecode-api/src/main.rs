mod handlers;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use wecode_common::config::EngineConfig;
use wecode_engine::{DockerSandbox, Executor, LanguageRegistry};

pub struct AppState {
    pub executor: Executor,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes::routes()).with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("WeCode API booting...");

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    info!(
        workspace_root = %config.workspace_root.display(),
        timeout_ms = config.timeout.as_millis() as u64,
        memory_mb = config.memory_mb,
        cpus = config.cpus,
        "Engine configured"
    );

    let registry = LanguageRegistry::from_config(&config);
    info!("Supported languages: {:?}", registry.ids());

    let sandbox = DockerSandbox::connect(&config).context("Failed to initialize Docker sandbox")?;
    let executor = Executor::new(config, registry, Arc::new(sandbox));

    let state = Arc::new(AppState { executor });

    let port = match std::env::var("PORT") {
        Ok(raw) => raw
            .parse::<u16>()
            .with_context(|| format!("Invalid PORT: {:?}", raw))?,
        Err(_) => 5000,
    };
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, finishing in-flight jobs...");
}
