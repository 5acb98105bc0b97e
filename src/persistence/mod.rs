//! Persistence layer: the summary ledger and shared fsync helpers.
//!
//! # File Layout
//!
//! ```text
//! <ledger_path>   # JSON Lines, one delivered item per line
//! ```
//!
//! Queue item files are owned by [`crate::spool`]; they reuse the atomic
//! write helper from [`fsync`].

pub mod fsync;
pub mod ledger;

pub use fsync::{fsync_dir, fsync_file, write_atomic};
pub use ledger::{LedgerError, LedgerRecords, SummaryLedger, stream_all};
