//! Payment intake endpoint.
//!
//! Validates the request body just enough for a worker to process it later,
//! then writes the raw body into the normal queue store. Delivery happens
//! asynchronously; a 202 only means the payment is durably queued.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::spool::StoreError;
use crate::types::{InvalidPaymentId, PaymentId};

/// Errors that can occur when accepting a payment.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payment must be a JSON object")]
    NotAnObject,

    #[error("payment is missing a string \"id\"")]
    MissingId,

    #[error("{0}")]
    InvalidId(#[from] InvalidPaymentId),

    #[error("payment is missing \"amount\"")]
    MissingAmount,

    #[error("failed to queue payment: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = match &self {
            IntakeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}

/// Payment intake handler.
///
/// # Response
///
/// - 202 Accepted: payment written to the normal store
/// - 400 Bad Request: body is not an object with a usable `id` and an `amount`
/// - 500 Internal Server Error: the store write failed
///
/// A payment with an id that is already queued replaces the queued one.
pub async fn intake_handler(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), IntakeError> {
    let id = validate_payment(&body).inspect_err(|e| {
        debug!(error = %e, "Rejected payment");
    })?;

    match app_state.queue().enqueue(&id, &body) {
        Ok(_) => {
            debug!(payment_id = %id, "Payment queued");
            Ok((StatusCode::ACCEPTED, "Accepted"))
        }
        Err(e) => {
            warn!(payment_id = %id, error = %e, "Failed to queue payment");
            Err(IntakeError::Store(e))
        }
    }
}

/// Checks the shape of an intake body and returns its id.
pub fn validate_payment(body: &[u8]) -> Result<PaymentId, IntakeError> {
    let value: Value = serde_json::from_slice(body)?;
    let object = value.as_object().ok_or(IntakeError::NotAnObject)?;

    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or(IntakeError::MissingId)?;
    let id = PaymentId::parse(id)?;

    if !object.contains_key("amount") {
        return Err(IntakeError::MissingAmount);
    }

    Ok(id)
}
