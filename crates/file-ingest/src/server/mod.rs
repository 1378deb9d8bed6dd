//! HTTP server for the ingestion service

pub mod routes;
pub mod state;

use axum::{routing::get, Json, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use state::AppState;

/// How often expired progress entries are swept
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Ingestion HTTP server
pub struct IngestServer {
    config: IngestConfig,
    state: AppState,
}

impl IngestServer {
    /// Create a new server, opening the configured stores
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let state = AppState::new(config.clone())?;
        Ok(Self { config, state })
    }

    /// Start the server and run until Ctrl+C
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let purge = spawn_progress_purge(self.state.clone());
        let router = build_router(self.state.clone());

        tracing::info!("Starting file ingest server on http://{}", addr);
        tracing::info!("API info: http://{}/api/info", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        purge.abort();
        served.map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        tracing::info!("Server stopped");
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }

    /// Shared state, mainly for embedding the router elsewhere
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let max_upload_size = state.config().server.max_upload_size;
    let enable_cors = state.config().server.enable_cors;

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", routes::api_routes(max_upload_size))
        .with_state(state)
        // Middleware layers (order matters - applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

fn spawn_progress_purge(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = state.progress().purge_expired();
            if purged > 0 {
                tracing::debug!("Purged {} expired progress entries", purged);
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "message": "File Parser API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
