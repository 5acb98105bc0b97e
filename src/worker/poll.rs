//! Worker count and scan pacing.
//!
//! Every worker runs two loops, one per store. A loop rescans immediately
//! after a pass that moved at least one item forward and sleeps for
//! `idle_interval` after a pass that did not. CPU use therefore stays
//! bounded when the queue is empty, however many workers run.
//!
//! Poison items (unparseable files) do not count as progress, so a store
//! holding only poison items is scanned at the idle rate.

use std::time::Duration;

/// Default number of worker identities (each runs two loops).
const DEFAULT_WORKERS: usize = 7;

/// Default sleep after a pass that made no progress.
const DEFAULT_IDLE_INTERVAL_MILLIS: u64 = 25;

/// Configuration for the worker pool's polling loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Number of worker identities. The pool runs twice as many loops.
    pub workers: usize,

    /// Sleep after a pass in which nothing was delivered or moved.
    pub idle_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    /// Creates a `PollConfig` with default values.
    pub fn new() -> Self {
        PollConfig {
            workers: DEFAULT_WORKERS,
            idle_interval: Duration::from_millis(DEFAULT_IDLE_INTERVAL_MILLIS),
        }
    }

    /// Total number of polling loops the pool spawns.
    pub fn loop_count(&self) -> usize {
        self.workers * 2
    }
}
