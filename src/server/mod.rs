//! HTTP server for the payment spool.
//!
//! # Endpoints
//!
//! - `POST /payments` - Accepts a payment and queues it durably (returns 202 Accepted)
//! - `GET /payments-summary` - Returns every delivered payment as a JSON array
//! - `GET /health` - Returns 200 if server is running

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod health;
pub mod intake;
pub mod summary;

pub use health::health_handler;
pub use intake::{IntakeError, intake_handler};
pub use summary::{SummaryError, summary_handler};

use crate::spool::QueueStore;

/// Shared application state, passed to handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Store that accepted payments are written to.
    queue: QueueStore,

    /// Ledger file read by the summary endpoint.
    ledger_path: PathBuf,
}

impl AppState {
    pub fn new(queue: QueueStore, ledger_path: impl Into<PathBuf>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                queue,
                ledger_path: ledger_path.into(),
            }),
        }
    }

    pub fn queue(&self) -> &QueueStore {
        &self.inner.queue
    }

    pub fn ledger_path(&self) -> &Path {
        &self.inner.ledger_path
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/payments", post(intake_handler))
        .route("/payments-summary", get(summary_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
