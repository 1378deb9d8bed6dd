//! File ingest server binary
//!
//! Run with: cargo run -p file-ingest --bin file-ingest-server
//! Set FILE_INGEST_CONFIG to a TOML file to override the defaults.

use file_ingest::{config::IngestConfig, server::IngestServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_ingest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = IngestConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Upload dir: {}", config.storage.upload_dir.display());
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - Max upload size: {} bytes", config.server.max_upload_size);
    tracing::info!("  - Parallel files: {}", config.processing.worker_limit());
    tracing::info!("  - Progress TTL: {}s", config.progress.ttl_secs);

    let server = IngestServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
