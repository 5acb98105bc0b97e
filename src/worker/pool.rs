//! Polling loops that drain the queue stores.
//!
//! # Item Processing Flow
//!
//! For every candidate found in a pass:
//! 1. Create the `.lock` marker (skip the item if another worker holds it)
//! 2. Read and parse the item
//! 3. Drive the retry policy against primary/fallback
//! 4. Delivered: append to the ledger, then remove the item file
//! 5. Exhausted: move the item to the priority store (normal lane) or leave
//!    it where it is (priority lane). An item whose id is claimed in the
//!    priority store stays in the normal store until that claim is gone
//! 6. Remove the `.lock` marker, whatever happened above
//!
//! Per-item states: `unclaimed → claimed → {delivered | escalated | requeued
//! | deferred | poisoned | vanished}`. Only `delivered` is terminal.
//!
//! # Failure Handling
//!
//! Nothing that happens to one item stops a loop. Filesystem failures are
//! logged and the item stays where it is, to be picked up by a later pass.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::delivery::{DeliveryOutcome, RetryPolicy, Transport};
use crate::persistence::SummaryLedger;
use crate::spool::{Candidate, Claim, ClaimOutcome, EscalateOutcome, QueueStore, StoreError};

use super::poll::PollConfig;

/// Which store a loop drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Priority,
    Normal,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Priority => f.write_str("priority"),
            Lane::Normal => f.write_str("normal"),
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Another worker holds the claim, or the claim could not be attempted.
    Skipped,

    /// The file was gone by the time it was read (another worker finished it).
    Vanished,

    /// The file does not parse. It stays in place and is retried next pass.
    Poisoned,

    /// Delivered, recorded, and removed from the store.
    Delivered,

    /// Exhausted in the normal store and moved to the priority store.
    Escalated,

    /// Exhausted in the priority store and left there for another round.
    Requeued,

    /// Exhausted in the normal store while the priority store holds a claimed
    /// item with the same id. Left in the normal store for a later pass.
    Deferred,

    /// A filesystem operation failed; the item stays where it was.
    Failed,
}

/// Counts of outcomes in one pass over a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub candidates: usize,
    pub skipped: usize,
    pub vanished: usize,
    pub poisoned: usize,
    pub delivered: usize,
    pub escalated: usize,
    pub requeued: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl PassReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Vanished => self.vanished += 1,
            ItemOutcome::Poisoned => self.poisoned += 1,
            ItemOutcome::Delivered => self.delivered += 1,
            ItemOutcome::Escalated => self.escalated += 1,
            ItemOutcome::Requeued => self.requeued += 1,
            ItemOutcome::Deferred => self.deferred += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }

    /// Whether any item was delivered or moved through the retry policy.
    pub fn made_progress(&self) -> bool {
        self.delivered + self.escalated + self.requeued > 0
    }
}

/// A fixed set of workers draining the normal and priority stores.
///
/// Cheap to clone; clones share the stores, ledger, and retry policy.
pub struct WorkerPool<T> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    normal: QueueStore,
    priority: QueueStore,
    ledger: Arc<SummaryLedger>,
    policy: RetryPolicy<T>,
    poll: PollConfig,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        WorkerPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static> WorkerPool<T> {
    pub fn new(
        normal: QueueStore,
        priority: QueueStore,
        ledger: Arc<SummaryLedger>,
        policy: RetryPolicy<T>,
        poll: PollConfig,
    ) -> Self {
        WorkerPool {
            inner: Arc::new(PoolInner {
                normal,
                priority,
                ledger,
                policy,
                poll,
            }),
        }
    }

    pub fn policy(&self) -> &RetryPolicy<T> {
        &self.inner.policy
    }

    pub fn store(&self, lane: Lane) -> &QueueStore {
        match lane {
            Lane::Priority => &self.inner.priority,
            Lane::Normal => &self.inner.normal,
        }
    }

    /// Where exhausted items go, from either lane. For the priority lane
    /// this is a move onto itself.
    fn escalation_target(&self) -> &QueueStore {
        &self.inner.priority
    }

    /// Spawns every polling loop: one priority and one normal loop per worker.
    ///
    /// Loops stop between items once `shutdown` is cancelled. A retry
    /// sequence already in progress runs to completion first.
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinSet<()> {
        let mut loops = JoinSet::new();

        for worker in 1..=self.inner.poll.workers {
            for lane in [Lane::Priority, Lane::Normal] {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                loops.spawn(async move { pool.run_loop(worker, lane, shutdown).await });
            }
        }

        info!(
            workers = self.inner.poll.workers,
            loops = loops.len(),
            "Worker pool started"
        );
        loops
    }

    /// Runs passes over one store until shutdown.
    async fn run_loop(self, worker: usize, lane: Lane, shutdown: CancellationToken) {
        debug!(worker, lane = %lane, "Polling loop started");

        while !shutdown.is_cancelled() {
            let progressed = match self.run_pass(worker, lane, &shutdown).await {
                Ok(report) => report.made_progress(),
                Err(e) => {
                    warn!(worker, lane = %lane, error = %e, "Failed to list queue directory");
                    false
                }
            };

            if progressed {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.inner.poll.idle_interval) => {}
            }
        }

        debug!(worker, lane = %lane, "Polling loop stopped");
    }

    /// Makes one pass over the store of `lane`.
    ///
    /// Lists the store once and tries every candidate in listing order.
    /// Returns an error only if the directory cannot be listed.
    #[instrument(skip(self, shutdown), fields(lane = %lane))]
    pub async fn run_pass(
        &self,
        worker: usize,
        lane: Lane,
        shutdown: &CancellationToken,
    ) -> Result<PassReport, StoreError> {
        let candidates = self.store(lane).list_candidates()?;
        let mut report = PassReport {
            candidates: candidates.len(),
            ..PassReport::default()
        };

        for candidate in &candidates {
            if shutdown.is_cancelled() {
                break;
            }
            let outcome = self.process_candidate(worker, lane, candidate).await;
            report.record(outcome);
        }

        Ok(report)
    }

    /// Claims, processes, and releases one candidate.
    pub async fn process_candidate(
        &self,
        worker: usize,
        lane: Lane,
        candidate: &Candidate,
    ) -> ItemOutcome {
        let store = self.store(lane);

        let claim = match store.try_claim(candidate) {
            Ok(ClaimOutcome::Claimed(claim)) => claim,
            Ok(ClaimOutcome::AlreadyClaimed) => return ItemOutcome::Skipped,
            Err(e) => {
                warn!(
                    worker,
                    lane = %lane,
                    file = %candidate.file_name,
                    error = %e,
                    "Failed to create lock marker"
                );
                return ItemOutcome::Skipped;
            }
        };

        let outcome = self.process_claimed(worker, lane, &claim).await;

        if let Err(e) = store.release(claim) {
            error!(
                worker,
                lane = %lane,
                file = %candidate.file_name,
                error = %e,
                "Failed to remove lock marker; item stays locked"
            );
        }

        outcome
    }

    async fn process_claimed(&self, worker: usize, lane: Lane, claim: &Claim) -> ItemOutcome {
        let store = self.store(lane);

        let item = match store.read(claim) {
            Ok(item) => item,
            Err(StoreError::Vanished(_)) => {
                debug!(worker, lane = %lane, file = %claim.file_name(), "Item already processed");
                return ItemOutcome::Vanished;
            }
            Err(e @ StoreError::MalformedItem { .. }) => {
                warn!(worker, lane = %lane, error = %e, "Failed to parse queued item");
                return ItemOutcome::Poisoned;
            }
            Err(e) => {
                warn!(
                    worker,
                    lane = %lane,
                    file = %claim.file_name(),
                    error = %e,
                    "Failed to read queued item"
                );
                return ItemOutcome::Failed;
            }
        };

        match self.inner.policy.deliver(&item).await {
            DeliveryOutcome::Delivered { target, attempts } => {
                if let Err(e) = self.inner.ledger.append(&item) {
                    error!(
                        worker,
                        payment_id = %item.id,
                        error = %e,
                        "Failed to record delivered payment in ledger"
                    );
                }
                if let Err(e) = store.remove(claim) {
                    error!(
                        worker,
                        lane = %lane,
                        payment_id = %item.id,
                        error = %e,
                        "Failed to remove delivered item; it will be delivered again"
                    );
                    return ItemOutcome::Failed;
                }
                info!(
                    worker,
                    lane = %lane,
                    payment_id = %item.id,
                    target = %target,
                    attempts,
                    "Payment processed"
                );
                ItemOutcome::Delivered
            }
            DeliveryOutcome::Exhausted { attempts } => {
                match store.escalate(claim, self.escalation_target()) {
                    Ok(EscalateOutcome::Moved(_)) => {
                        warn!(
                            worker,
                            payment_id = %item.id,
                            attempts,
                            "Delivery attempts exhausted, moved to priority queue"
                        );
                        ItemOutcome::Escalated
                    }
                    Ok(EscalateOutcome::Unchanged(_)) => {
                        warn!(
                            worker,
                            payment_id = %item.id,
                            attempts,
                            "Delivery attempts exhausted, item stays in priority queue"
                        );
                        ItemOutcome::Requeued
                    }
                    Ok(EscalateOutcome::TargetClaimed) => {
                        info!(
                            worker,
                            payment_id = %item.id,
                            attempts,
                            "Delivery attempts exhausted, priority copy is in flight; will retry"
                        );
                        ItemOutcome::Deferred
                    }
                    Err(e) => {
                        error!(
                            worker,
                            lane = %lane,
                            payment_id = %item.id,
                            error = %e,
                            "Failed to escalate exhausted item"
                        );
                        ItemOutcome::Failed
                    }
                }
            }
        }
    }
}
