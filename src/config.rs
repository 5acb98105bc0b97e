//! Runtime configuration from command-line flags or `PAYMENT_SPOOL_*`
//! environment variables.
//!
//! Every setting has a default. A value that is set but does not parse is a
//! startup error, not a silent fallback.
//!
//! | Flag / variable                                             | Default                                  |
//! |-------------------------------------------------------------|------------------------------------------|
//! | `--bind-addr` / `PAYMENT_SPOOL_BIND_ADDR`                   | `0.0.0.0:8081`                           |
//! | `--queue-dir` / `PAYMENT_SPOOL_QUEUE_DIR`                   | `/data/queue/normal`                     |
//! | `--priority-dir` / `PAYMENT_SPOOL_PRIORITY_DIR`             | `/data/queue/priority`                   |
//! | `--ledger-path` / `PAYMENT_SPOOL_LEDGER_PATH`               | `/data/summary.json`                     |
//! | `--log-path` / `PAYMENT_SPOOL_LOG_PATH`                     | `/data/app.log`                          |
//! | `--primary-url` / `PAYMENT_SPOOL_PRIMARY_URL`               | `http://main-endpoint:8080/payments`     |
//! | `--fallback-url` / `PAYMENT_SPOOL_FALLBACK_URL`             | `http://fallback-endpoint:8080/payments` |
//! | `--workers` / `PAYMENT_SPOOL_WORKERS`                       | `7`                                      |
//! | `--request-timeout-ms` / `PAYMENT_SPOOL_REQUEST_TIMEOUT_MS` | `500`                                    |
//! | `--max-attempts` / `PAYMENT_SPOOL_MAX_ATTEMPTS`             | `5`                                      |
//! | `--initial-backoff-ms` / `PAYMENT_SPOOL_INITIAL_BACKOFF_MS` | `100`                                    |
//! | `--max-backoff-ms` / `PAYMENT_SPOOL_MAX_BACKOFF_MS`         | `10000`                                  |
//! | `--idle-interval-ms` / `PAYMENT_SPOOL_IDLE_INTERVAL_MS`     | `25`                                     |
//! | `--clear-stale-locks` / `PAYMENT_SPOOL_CLEAR_STALE_LOCKS`   | `true`                                   |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::{BoolishValueParser, RangedU64ValueParser};
use clap::{ArgAction, Parser};

use crate::delivery::{RetryConfig, Targets};
use crate::worker::PollConfig;

/// Full process configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "payment-spool", about = "Durable file-backed payment queue")]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "PAYMENT_SPOOL_BIND_ADDR", default_value = "0.0.0.0:8081")]
    pub bind_addr: SocketAddr,

    /// Directory of the normal queue store
    #[arg(long, env = "PAYMENT_SPOOL_QUEUE_DIR", default_value = "/data/queue/normal")]
    pub queue_dir: PathBuf,

    /// Directory of the priority queue store
    #[arg(
        long,
        env = "PAYMENT_SPOOL_PRIORITY_DIR",
        default_value = "/data/queue/priority"
    )]
    pub priority_dir: PathBuf,

    /// Path of the summary ledger
    #[arg(long, env = "PAYMENT_SPOOL_LEDGER_PATH", default_value = "/data/summary.json")]
    pub ledger_path: PathBuf,

    /// Path of the log file, written in addition to stdout
    #[arg(long, env = "PAYMENT_SPOOL_LOG_PATH", default_value = "/data/app.log")]
    pub log_path: PathBuf,

    /// Endpoint tried first on every attempt
    #[arg(
        long,
        env = "PAYMENT_SPOOL_PRIMARY_URL",
        default_value = "http://main-endpoint:8080/payments"
    )]
    pub primary_url: String,

    /// Endpoint tried when the primary refuses
    #[arg(
        long,
        env = "PAYMENT_SPOOL_FALLBACK_URL",
        default_value = "http://fallback-endpoint:8080/payments"
    )]
    pub fallback_url: String,

    /// Number of workers; each runs one loop per store
    #[arg(
        long,
        env = "PAYMENT_SPOOL_WORKERS",
        default_value = "7",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub workers: usize,

    /// Timeout of one delivery POST, in milliseconds
    #[arg(
        long,
        env = "PAYMENT_SPOOL_REQUEST_TIMEOUT_MS",
        default_value = "500",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout_ms: u64,

    /// Delivery attempts before an item is escalated
    #[arg(
        long,
        env = "PAYMENT_SPOOL_MAX_ATTEMPTS",
        default_value = "5",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds
    #[arg(long, env = "PAYMENT_SPOOL_INITIAL_BACKOFF_MS", default_value = "100")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff delay, in milliseconds
    #[arg(long, env = "PAYMENT_SPOOL_MAX_BACKOFF_MS", default_value = "10000")]
    pub max_backoff_ms: u64,

    /// Sleep between scans of a store that had nothing to do, in milliseconds
    #[arg(long, env = "PAYMENT_SPOOL_IDLE_INTERVAL_MS", default_value = "25")]
    pub idle_interval_ms: u64,

    /// Delete leftover lock markers before workers start
    #[arg(
        long,
        env = "PAYMENT_SPOOL_CLEAR_STALE_LOCKS",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub clear_stale_locks: bool,
}

impl Config {
    /// Primary and fallback delivery endpoints.
    pub fn targets(&self) -> Targets {
        Targets::new(&self.primary_url, &self.fallback_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff between delivery attempts. The multiplier is not configurable.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            RetryConfig::DEFAULT.backoff_multiplier,
        )
    }

    /// Worker count and scan pacing.
    pub fn poll(&self) -> PollConfig {
        PollConfig {
            workers: self.workers,
            idle_interval: Duration::from_millis(self.idle_interval_ms),
        }
    }
}
