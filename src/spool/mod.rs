//! Durable payment queue on the filesystem.
//!
//! Two stores exist: *normal*, where intake enqueues, and *priority*, where
//! items go after exhausting their delivery attempts. Both share the same
//! on-disk layout (see [`store`]). An item lives in exactly one store at a
//! time; escalation renames the file, it never copies it.
//!
//! # Crash Safety
//!
//! - Items are written atomically (staging file + fsync + rename + dir fsync)
//! - Lock markers are empty, so creating one is atomic
//! - A process crash leaves its markers behind; [`QueueStore::clear_stale_locks`]
//!   removes them at the next startup
//!
//! Delivery is at-least-once: a crash after a successful POST but before the
//! item file is removed means the item is delivered again after restart.

pub mod store;

pub use store::{
    Candidate, Claim, ClaimOutcome, EscalateOutcome, QueueStore, Result, StoreError, StoreKind,
};
