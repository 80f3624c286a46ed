//! Chat History Backend
//!
//! A REST API server that streams answers from several LLM providers and keeps
//! the full history of every dialog.

use chat_history_backend::api::build_router;
use chat_history_backend::chat::{CancellationRegistry, ChatDb};
use chat_history_backend::config::Config;
use chat_history_backend::provider::ProviderRegistry;
use chat_history_backend::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded: {:?}", config);

    let db = ChatDb::new(&config.persistence.database_path).await?;
    std::fs::create_dir_all(&config.persistence.uploads_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create uploads directory: {}", e))?;

    let providers = ProviderRegistry::from_config(
        &config.providers,
        config.streaming.connect_timeout_secs,
    );

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    let app_state = AppState::new(config, db, providers);
    let cancellations = app_state.cancellations.clone();
    let app = build_router(app_state);

    info!("🚀 Server running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancellations))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
///
/// Active streams are asked to stop so their partial answers get persisted
/// while connections drain.
async fn shutdown_signal(cancellations: Arc<CancellationRegistry>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }

    cancellations.set_all();
}
