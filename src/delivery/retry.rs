//! Bounded exponential backoff around primary-then-fallback delivery.
//!
//! One *attempt* tries the primary target and, only if that fails, the
//! fallback target. The two are never retried independently. Between failed
//! attempts the policy sleeps:
//!
//! - Default: 5 attempts, delays of 100 ms, 200 ms, 400 ms, 800 ms
//! - Delays double each time and are capped at 10 s
//!
//! There is no sleep after the final attempt; the caller escalates instead.

use std::time::Duration;

use tracing::{debug, info};

use super::client::{TargetRole, Targets, Transport};
use crate::types::QueueItem;

/// Configuration for exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub initial_delay: Duration,

    /// Ceiling for the exponential growth.
    pub max_delay: Duration,

    /// Growth factor between consecutive delays (typically 2.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 5 attempts, 100 ms initial delay doubling up to 10 s.
    pub const DEFAULT: Self = Self {
        max_attempts: 5,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(10),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (0-indexed).
    ///
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// The sleeps a fully failing item goes through, in order.
    ///
    /// One fewer than `max_attempts`: nothing is slept after the last attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.delay_for_attempt(attempt))
    }

    /// Upper bound on the time spent sleeping for one item.
    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of driving one item through the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A target accepted the item.
    Delivered {
        /// Which target accepted it.
        target: TargetRole,
        /// Attempt number that succeeded (1-based).
        attempts: u32,
    },

    /// Every attempt failed against both targets.
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Delivers items to the configured targets with bounded retries.
#[derive(Debug)]
pub struct RetryPolicy<T> {
    transport: T,
    targets: Targets,
    config: RetryConfig,
}

impl<T: Transport> RetryPolicy<T> {
    pub fn new(transport: T, targets: Targets, config: RetryConfig) -> Self {
        RetryPolicy {
            transport,
            targets,
            config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Tries to deliver `item`, sleeping between failed attempts.
    ///
    /// Occupies the calling task for the whole retry sequence. Never fails:
    /// running out of attempts is reported as [`DeliveryOutcome::Exhausted`].
    pub async fn deliver(&self, item: &QueueItem) -> DeliveryOutcome {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            for target in self.targets.in_order() {
                if self.transport.send(target, item).await {
                    if attempt > 1 || target.role == TargetRole::Fallback {
                        info!(
                            payment_id = %item.id,
                            target = %target.role,
                            attempt,
                            "Payment delivered after failures"
                        );
                    }
                    return DeliveryOutcome::Delivered {
                        target: target.role,
                        attempts: attempt,
                    };
                }
            }

            if attempt < max_attempts {
                let delay = self.config.delay_for_attempt(attempt - 1);
                debug!(
                    payment_id = %item.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Both targets failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        DeliveryOutcome::Exhausted {
            attempts: max_attempts,
        }
    }
}
