//! Payment Spool - a durable, file-backed payment queue with retrying delivery.
//!
//! Payments accepted over HTTP are written to a directory-backed queue. A
//! pool of workers claims them with lock markers, delivers them to a primary
//! endpoint (falling back to a second one), and records each delivered
//! payment once in an append-only ledger.

pub mod config;
pub mod delivery;
pub mod persistence;
pub mod server;
pub mod spool;
pub mod telemetry;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_utils;
