//! Worker pool draining the queue stores.
//!
//! A fixed number of workers each run two polling loops, one over the
//! priority store and one over the normal store. Loops share nothing but the
//! filesystem: mutual exclusion on an item comes from its lock marker, and
//! ledger appends are serialized inside [`SummaryLedger`].
//!
//! # Module Structure
//!
//! - [`pool`]: the loops and per-item processing
//! - [`poll`]: worker count and idle pacing
//!
//! [`SummaryLedger`]: crate::persistence::SummaryLedger

mod poll;
mod pool;


pub use poll::PollConfig;
pub use pool::{ItemOutcome, Lane, PassReport, WorkerPool};
