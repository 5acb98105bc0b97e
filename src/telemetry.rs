//! Tracing subscriber setup.
//!
//! Events go to stdout and, without ANSI colors, to an append-mode log file.
//! `RUST_LOG` overrides the default filter.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "payment_spool=info,tower_http=info";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tracing subscriber already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber. Fails if the log file cannot be opened.
pub fn init(log_path: &Path) -> Result<(), TelemetryError> {
    let file = open_log_file(log_path)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        .try_init()?;

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Opens `path` for appending, creating it and its parent directory.
fn open_log_file(path: &Path) -> Result<File, TelemetryError> {
    let open = || -> io::Result<File> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    };

    open().map_err(|source| TelemetryError::LogFile {
        path: path.to_path_buf(),
        source,
    })
}
