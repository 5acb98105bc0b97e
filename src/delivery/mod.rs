//! Delivery of queued payments to the remote endpoints.
//!
//! - [`client`]: one attempt against one target ([`Transport`], [`HttpTransport`])
//! - [`retry`]: bounded exponential backoff over primary-then-fallback attempts
//! - [`error`]: failure causes, used for logging only
//!
//! Failures never escape as errors: a single attempt reports a boolean and
//! the retry engine reports a [`DeliveryOutcome`].

mod client;
mod error;
mod retry;

pub use client::{DEFAULT_REQUEST_TIMEOUT, HttpTransport, Target, TargetRole, Targets, Transport};
pub use error::DeliveryFailure;
pub use retry::{DeliveryOutcome, RetryConfig, RetryPolicy};
