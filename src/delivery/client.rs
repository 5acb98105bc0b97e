//! Single-attempt delivery of one item to one target.
//!
//! [`Transport`] is the seam between the retry engine and the network.
//! [`HttpTransport`] POSTs the item's canonical JSON with a short timeout;
//! tests substitute scripted transports.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::error::DeliveryFailure;
use crate::types::QueueItem;

/// Default timeout for one POST, connection included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Which of the two configured endpoints a target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRole {
    Primary,
    Fallback,
}

impl fmt::Display for TargetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRole::Primary => f.write_str("primary"),
            TargetRole::Fallback => f.write_str("fallback"),
        }
    }
}

/// A remote endpoint that accepts payment POSTs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub role: TargetRole,
    pub url: String,
}

/// The primary endpoint and the one tried when it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    pub primary: Target,
    pub fallback: Target,
}

impl Targets {
    pub fn new(primary_url: impl Into<String>, fallback_url: impl Into<String>) -> Self {
        Targets {
            primary: Target {
                role: TargetRole::Primary,
                url: primary_url.into(),
            },
            fallback: Target {
                role: TargetRole::Fallback,
                url: fallback_url.into(),
            },
        }
    }

    /// Targets in the order they are tried within one attempt.
    pub fn in_order(&self) -> [&Target; 2] {
        [&self.primary, &self.fallback]
    }
}

/// Makes one best-effort delivery attempt.
///
/// Implementations must not retry and must not panic on network failure:
/// the outcome is reported only through the returned boolean.
pub trait Transport: Send + Sync {
    /// Sends `item` to `target`. Returns true iff the target accepted it.
    fn send(&self, target: &Target, item: &QueueItem) -> impl Future<Output = bool> + Send;
}

/// Delivers items over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }

    /// Sends the item and reports the failure cause, if any.
    ///
    /// Returns the response status on success (200-299).
    pub async fn try_send(&self, target: &Target, item: &QueueItem) -> Result<u16, DeliveryFailure> {
        let body = item.to_canonical_json()?;

        let response = self
            .client
            .post(&target.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DeliveryFailure::Status(status.as_u16()))
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, target: &Target, item: &QueueItem) -> bool {
        match self.try_send(target, item).await {
            Ok(status) => {
                debug!(
                    payment_id = %item.id,
                    target = %target.role,
                    status,
                    "Payment delivered"
                );
                true
            }
            Err(e) => {
                warn!(
                    payment_id = %item.id,
                    target = %target.role,
                    url = %target.url,
                    timeout = e.is_timeout(),
                    error = %e,
                    "Delivery attempt failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StubEndpoint;
    use crate::types::PaymentId;
    use axum::http::StatusCode;

    fn item() -> QueueItem {
        QueueItem::new(PaymentId::parse("p2").unwrap(), "5.00")
    }

    fn primary(url: String) -> Target {
        Target {
            role: TargetRole::Primary,
            url,
        }
    }

    #[test]
    fn targets_are_tried_primary_first() {
        let targets = Targets::new("http://a", "http://b");
        let [first, second] = targets.in_order();
        assert_eq!(first.role, TargetRole::Primary);
        assert_eq!(second.role, TargetRole::Fallback);
    }

    #[tokio::test]
    async fn success_status_returns_true_and_posts_canonical_json() {
        let endpoint = StubEndpoint::start(vec![StatusCode::OK]).await;
        let transport = HttpTransport::new(DEFAULT_REQUEST_TIMEOUT).unwrap();

        assert!(transport.send(&primary(endpoint.url()), &item()).await);

        let bodies = endpoint.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0], r#"{"id":"p2","amount":"5.00"}"#);
    }

    #[tokio::test]
    async fn accepted_and_no_content_count_as_success() {
        let endpoint = StubEndpoint::start(vec![StatusCode::ACCEPTED, StatusCode::NO_CONTENT]).await;
        let transport = HttpTransport::new(DEFAULT_REQUEST_TIMEOUT).unwrap();

        assert!(transport.send(&primary(endpoint.url()), &item()).await);
        assert!(transport.send(&primary(endpoint.url()), &item()).await);
    }

    #[tokio::test]
    async fn server_error_returns_false() {
        let endpoint = StubEndpoint::start(vec![StatusCode::INTERNAL_SERVER_ERROR]).await;
        let transport = HttpTransport::new(DEFAULT_REQUEST_TIMEOUT).unwrap();

        let failure = transport
            .try_send(&primary(endpoint.url()), &item())
            .await
            .unwrap_err();
        assert_eq!(failure.status_code(), Some(500));
        assert!(!transport.send(&primary(endpoint.url()), &item()).await);
    }

    #[tokio::test]
    async fn redirect_status_is_not_success() {
        let endpoint = StubEndpoint::start(vec![StatusCode::NOT_MODIFIED]).await;
        let transport = HttpTransport::new(DEFAULT_REQUEST_TIMEOUT).unwrap();

        assert!(!transport.send(&primary(endpoint.url()), &item()).await);
    }

    #[tokio::test]
    async fn unreachable_target_returns_false() {
        let transport = HttpTransport::new(DEFAULT_REQUEST_TIMEOUT).unwrap();
        // Port 9 (discard) on localhost is not listening in test environments.
        let target = primary("http://127.0.0.1:9/payments".to_string());

        assert!(!transport.send(&target, &item()).await);
    }

    #[tokio::test]
    async fn slow_target_times_out() {
        let endpoint = StubEndpoint::start_with_delay(
            vec![StatusCode::OK],
            Duration::from_millis(300),
        )
        .await;
        let transport = HttpTransport::new(Duration::from_millis(50)).unwrap();

        let failure = transport
            .try_send(&primary(endpoint.url()), &item())
            .await
            .unwrap_err();
        assert!(failure.is_timeout());
    }
}
