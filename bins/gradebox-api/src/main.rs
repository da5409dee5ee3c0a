mod error;
mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use gradebox_common::catalog::Catalog;
use gradebox_engine::{Engine, EngineConfig, LanguageConfigManager};
use metrics::Metrics;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{info, warn};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub engine: Engine,
    /// Bounds how many runs execute at once across all requests
    pub runs: Arc<Semaphore>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>, engine: Engine, max_concurrent_runs: usize) -> Result<Self> {
        Ok(Self {
            catalog,
            engine,
            runs: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            metrics: Metrics::new().context("Failed to create metrics registry")?,
        })
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("GRADEBOX_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_catalog() -> Result<Catalog> {
    match std::env::var("GRADEBOX_CATALOG") {
        Ok(path) => Catalog::load(Path::new(&path))
            .with_context(|| format!("Failed to load catalog from {}", path)),
        Err(_) => Catalog::builtin().context("Failed to load built-in catalog"),
    }
}

fn max_concurrent_runs() -> Result<usize> {
    match std::env::var("GRADEBOX_MAX_CONCURRENT_RUNS") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid GRADEBOX_MAX_CONCURRENT_RUNS '{}'", value)),
        Err(_) => Ok(DEFAULT_MAX_CONCURRENT_RUNS),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("gradebox API booting...");

    let config = EngineConfig::from_env()?;
    let languages = LanguageConfigManager::load_or_default(&config.languages_path)?;
    let engine = Engine::from_config(&config, languages).context("Failed to start execution backend")?;

    let catalog = load_catalog()?;
    info!(challenges = catalog.len(), "Challenge catalog loaded");

    let max_runs = max_concurrent_runs()?;
    let state = Arc::new(AppState::new(Arc::new(catalog), engine, max_runs)?);

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    // Start server
    let addr = std::env::var("GRADEBOX_BIND").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(max_concurrent_runs = max_runs, "HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if signal::ctrl_c().await.is_ok() {
                warn!("Received shutdown signal, finishing in-flight runs...");
            }
        })
        .await
        .context("Server error")?;

    info!("gradebox API stopped");
    Ok(())
}
