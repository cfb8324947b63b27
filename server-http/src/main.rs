use keystone::persistence::{
    MemoryTransactionManager, PgTransactionManager, StorageInitError, TransactionManager,
};
use server_http::{build_router, sweeper, AppState};
use shared::config::{Config, Storage};
use shared::ConfigError;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("storage initialization failed: {0}")]
    Storage(#[from] StorageInitError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file (if exists)
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dotenv {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    info!("Starting keystone HTTP server...");

    let config = Config::from_env()?;

    let (tx_manager, pg): (Arc<dyn TransactionManager>, Option<PgTransactionManager>) =
        match &config.storage {
            Storage::Postgres {
                url,
                max_connections,
            } => {
                let pg = PgTransactionManager::connect(url, *max_connections).await?;
                pg.migrate().await?;
                (Arc::new(pg.clone()), Some(pg))
            }
            Storage::Memory => {
                warn!("Using in-memory storage, users and sessions are lost on exit");
                (Arc::new(MemoryTransactionManager::new()), None)
            }
        };

    let state = AppState::new(tx_manager, config.session_ttl);

    let sweeper = config
        .session_sweep_interval
        .map(|interval| sweeper::spawn_session_sweeper(state.clone(), interval));

    let router = build_router(state, &config.allowed_origins);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("HTTP Server listening on http://{}", address);

    // Graceful shutdown handler
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    if let Some(pg) = pg {
        pg.close().await;
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
