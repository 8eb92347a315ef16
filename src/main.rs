//! Cloudsave Server
//!
//! Serves save-data sync over HTTP, backed by local, SQLite and
//! S3-compatible save stores.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cloudsave_server::config::Config;
use cloudsave_server::providers::{LocalStoreProvider, S3Provider, SqliteProvider};
use cloudsave_server::state::AppState;
use cloudsave_server::storage::S3Client;
use cloudsave_server::sync::SyncManager;
use cloudsave_server::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudsave_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Starting Cloudsave Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        strategy = ?config.sync.conflict_resolution,
        fields = ?config.sync.monitored_fields,
        "Sync {}",
        if config.sync.enabled { "enabled" } else { "disabled" }
    );

    let manager = build_manager(&config).await?;
    let app = routes::app(AppState::new(config.clone(), manager));

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Cloudsave Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Register the built-in providers in priority order: local, sqlite, s3
async fn build_manager(config: &Config) -> anyhow::Result<SyncManager> {
    let manager = SyncManager::new(config.sync.clone());
    let max_saves = config.providers.max_saves;

    let local = LocalStoreProvider::new(&config.providers.local_dir, max_saves);
    tracing::info!("Local saves at {}", config.providers.local_dir.display());
    manager.register_provider("local", Arc::new(local)).await;

    match db::create_pool(&config.database.url).await {
        Ok(pool) => {
            let sqlite = SqliteProvider::new(pool, max_saves);
            sqlite.init().await.context("Failed to initialize save table")?;
            tracing::info!("Database initialized at {}", config.database.url);
            manager.register_provider("sqlite", Arc::new(sqlite)).await;
        }
        Err(e) => {
            tracing::warn!("Database unavailable, sqlite provider disabled: {}", e);
        }
    }

    if let Some(storage) = &config.storage {
        tracing::info!("S3 endpoint: {}", storage.endpoint);
        tracing::info!("S3 bucket: {}", storage.bucket);
        let client = S3Client::new(storage)
            .await
            .context("Failed to initialize S3 client")?;
        let s3 = S3Provider::new(client, storage.prefix.clone(), max_saves);
        manager.register_provider("s3", Arc::new(s3)).await;
    }

    if let Some(name) = &config.providers.default_provider {
        if let Err(e) = manager.set_active_provider(name).await {
            tracing::warn!("Cannot activate default provider {}: {}", name, e);
        }
    }

    Ok(manager)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
