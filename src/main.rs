use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use payment_spool::config::Config;
use payment_spool::delivery::{HttpTransport, RetryPolicy};
use payment_spool::persistence::{LedgerError, SummaryLedger};
use payment_spool::server::{AppState, build_router};
use payment_spool::spool::{QueueStore, StoreError, StoreKind};
use payment_spool::telemetry::{self, TelemetryError};
use payment_spool::worker::WorkerPool;

/// Failures that stop the process before or while serving.
#[derive(Debug, Error)]
enum StartupError {
    #[error("{0}")]
    Telemetry(#[from] TelemetryError),

    #[error("cannot prepare queue directory: {0}")]
    Store(#[from] StoreError),

    #[error("cannot open ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::parse();
    telemetry::init(&config.log_path)?;
    info!(?config, "Starting payment spool");

    let normal = QueueStore::open(&config.queue_dir, StoreKind::Normal)?;
    let priority = QueueStore::open(&config.priority_dir, StoreKind::Priority)?;

    // Must run before any worker exists; afterwards it would break live claims.
    if config.clear_stale_locks {
        normal.clear_stale_locks()?;
        priority.clear_stale_locks()?;
    }

    let ledger = Arc::new(SummaryLedger::open(&config.ledger_path)?);
    let transport = HttpTransport::new(config.request_timeout())?;
    let policy = RetryPolicy::new(transport, config.targets(), config.retry());

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(normal.clone(), priority, ledger, policy, config.poll());
    let mut workers = pool.spawn(shutdown.clone());

    let app = build_router(AppState::new(normal, &config.ledger_path));
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.bind_addr,
            source,
        })?;
    info!(addr = %config.bind_addr, "Listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    info!("Waiting for workers to finish in-flight items");
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Worker loop panicked");
        }
    }
    info!("Shutdown complete");

    served.map_err(StartupError::Serve)
}

/// Resolves on ctrl-c or on cancellation from elsewhere.
async fn shutdown_signal(shutdown: CancellationToken) {
    wait_for_shutdown(tokio::signal::ctrl_c(), shutdown).await;
}

/// Waits for `signal` or for `shutdown` to be cancelled, then cancels
/// `shutdown`. If the signal listener fails, only cancellation ends the wait.
async fn wait_for_shutdown(
    signal: impl Future<Output = io::Result<()>>,
    shutdown: CancellationToken,
) {
    tokio::select! {
        result = signal => match result {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => {
                error!(error = %e, "Failed to listen for ctrl-c; waiting for cancellation");
                shutdown.cancelled().await;
            }
        },
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
