//! Liveness endpoint.
//!
//! Answers as long as the HTTP server runs. Says nothing about the workers
//! or the delivery targets.

use axum::http::StatusCode;

/// Health check handler. Always `200 OK` with the text "OK".
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
