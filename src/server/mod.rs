// HTTP transport for the loop registry
//
// Thin JSON layer: every route delegates to `LoopRegistry` or the shared
// chat backend. Responses use the `{success, ..., error?}` envelope.

mod handlers;
pub mod types;

pub use handlers::{
    analyze_loop, chat, health_check, list_loops, list_models, loop_metrics, loop_status,
    metrics_endpoint, start_loop, stop_loop, submit_goal,
};

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::monitoring;
use crate::registry::LoopRegistry;

/// Request bodies are small JSON documents
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// How long shutdown waits for each loop to finish its current iteration
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Shared handler state
pub struct AppState {
    pub registry: LoopRegistry,
    pub prometheus: prometheus::Registry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(registry: LoopRegistry) -> Result<Self> {
        let prometheus =
            monitoring::new_registry().context("Failed to register Prometheus counters")?;
        Ok(Self {
            registry,
            prometheus,
            started_at: Instant::now(),
        })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/v1/models", get(list_models))
        .route("/v1/loops", get(list_loops).post(start_loop))
        .route("/v1/loops/:id", get(loop_status).delete(stop_loop))
        .route("/v1/loops/:id/analyze", post(analyze_loop))
        .route("/v1/loops/:id/goals", post(submit_goal))
        .route("/v1/loops/:id/metrics", get(loop_metrics))
        .route("/v1/chat", post(chat))
        .with_state(state)
}

pub struct LooperServer {
    state: Arc<AppState>,
    config: ServerConfig,
}

impl LooperServer {
    pub fn new(registry: LoopRegistry, config: ServerConfig) -> Result<Self> {
        Ok(Self {
            state: Arc::new(AppState::new(registry)?),
            config,
        })
    }

    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
            .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves, then stop every running loop.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self
            .config
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.config.bind_address))?;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!("Looper server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error")?;

        let stopped = self.state.registry.shutdown(SHUTDOWN_GRACE).await;
        tracing::info!("Server stopped ({} loops shut down)", stopped);
        Ok(())
    }
}
