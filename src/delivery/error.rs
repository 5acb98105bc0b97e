//! Delivery failure types.
//!
//! A failed attempt is never an error for the caller of
//! [`Transport::send`](super::Transport::send); it only reports `false`.
//! These types exist so the failure can be logged with its cause.

use thiserror::Error;

/// Why a single delivery attempt against one target failed.
#[derive(Debug, Error)]
pub enum DeliveryFailure {
    /// The item could not be encoded as JSON.
    #[error("could not encode item: {0}")]
    Encode(#[from] serde_json::Error),

    /// Connection failure, timeout, or other transport-level error.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The target answered with a status outside 200-299.
    #[error("target responded with HTTP {0}")]
    Status(u16),
}

impl DeliveryFailure {
    /// Returns true if the attempt hit the request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeliveryFailure::Transport(e) if e.is_timeout())
    }

    /// The HTTP status code, if the target answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DeliveryFailure::Status(code) => Some(*code),
            DeliveryFailure::Transport(e) => e.status().map(|s| s.as_u16()),
            DeliveryFailure::Encode(_) => None,
        }
    }
}
