//! Directory-backed queue store with lock-marker claims.
//!
//! One store is one directory. Each pending payment is a file, and a worker
//! owns an item exactly while the item's `.lock` marker exists:
//!
//! ```text
//! <id>.json        - pending item (raw producer payload)
//! <id>.json.lock   - claim marker (empty; created with O_CREAT | O_EXCL)
//! <id>.json.tmp    - staging file of an in-progress enqueue
//! ```
//!
//! The marker is the only concurrency control. It is created with
//! `create_new`, which fails if the file exists, so two workers racing for the
//! same item cannot both succeed.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::persistence::fsync::{fsync_dir, write_atomic};
use crate::types::{InvalidPaymentId, PaymentId, QueueItem};

const ITEM_EXTENSION: &str = "json";
const LOCK_SUFFIX: &str = ".lock";
const STAGING_SUFFIX: &str = ".tmp";

/// Errors that can occur during queue store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure (write, rename, delete, listing).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The item file exists but does not parse as a queue item.
    #[error("malformed item {path}: {source}")]
    MalformedItem {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The item file disappeared between listing and reading.
    #[error("item vanished before it could be read: {0}")]
    Vanished(PathBuf),

    /// The payment id cannot be used as a file name.
    #[error("{0}")]
    InvalidId(#[from] InvalidPaymentId),
}

/// Result type for queue store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Which of the two stores this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Normal,
    Priority,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Normal => "normal",
            StoreKind::Priority => "priority",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item file found by [`QueueStore::list_candidates`].
///
/// A candidate is only a name. Nothing about it may be read or changed until
/// it has been claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Base name of the item file (`<id>.json`).
    pub file_name: String,

    /// Full path of the item file.
    pub path: PathBuf,
}

impl Candidate {
    /// Path of the lock marker guarding this item.
    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.path)
    }
}

/// Proof that the caller holds the lock marker for one item.
///
/// Must be handed back to [`QueueStore::release`] on every path.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a claim must be released or the item stays locked"]
pub struct Claim {
    candidate: Candidate,
    lock_path: PathBuf,
}

impl Claim {
    pub fn file_name(&self) -> &str {
        &self.candidate.file_name
    }

    pub fn item_path(&self) -> &Path {
        &self.candidate.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// Result of moving a claimed item to another store.
#[derive(Debug, PartialEq, Eq)]
pub enum EscalateOutcome {
    /// The item now lives at this path in the target store.
    Moved(PathBuf),

    /// Source and target are the same store; the item stays at this path.
    Unchanged(PathBuf),

    /// Another worker holds the destination's marker. The item was not moved.
    TargetClaimed,
}

/// Result of attempting to claim a candidate.
#[derive(Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The lock marker was created; the caller owns the item.
    Claimed(Claim),

    /// Another worker holds the marker. Skip the item.
    AlreadyClaimed,
}

/// A durable queue backed by one directory.
#[derive(Debug, Clone)]
pub struct QueueStore {
    dir: PathBuf,
    kind: StoreKind,
}

impl QueueStore {
    /// Opens the store at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>, kind: StoreKind) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(QueueStore { dir, kind })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Path the item with `id` has (or would have) in this store.
    pub fn item_path(&self, id: &PaymentId) -> PathBuf {
        self.dir.join(id.file_name())
    }

    /// Writes a raw payload as the item `id`.
    ///
    /// An existing item with the same id is replaced (last write wins). The
    /// write goes through a staging file and a rename, so a worker never sees
    /// a half-written item.
    pub fn enqueue(&self, id: &PaymentId, payload: &[u8]) -> Result<PathBuf> {
        let target = self.item_path(id);
        let staging = staging_path_for(&target);

        if let Err(e) = write_atomic(&self.dir, &staging, &target, payload) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }

        debug!(store = %self.kind, payment_id = %id, "Item enqueued");
        Ok(target)
    }

    /// Lists the item files currently in the store.
    ///
    /// Lock markers, staging files, and directories are skipped. The order is
    /// whatever the directory enumeration yields and may differ between calls.
    pub fn list_candidates(&self) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();

            if !path.extension().is_some_and(|e| e == ITEM_EXTENSION) {
                continue;
            }
            // The entry may have been removed since the listing; that is fine.
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };

            candidates.push(Candidate { file_name, path });
        }

        Ok(candidates)
    }

    /// Attempts to claim a candidate by creating its lock marker.
    ///
    /// Uses an exclusive create, never check-then-create. Losing the race is
    /// [`ClaimOutcome::AlreadyClaimed`], not an error.
    pub fn try_claim(&self, candidate: &Candidate) -> Result<ClaimOutcome> {
        let lock_path = candidate.lock_path();

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => {
                drop(file);
                Ok(ClaimOutcome::Claimed(Claim {
                    candidate: candidate.clone(),
                    lock_path,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(ClaimOutcome::AlreadyClaimed),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads and parses a claimed item.
    ///
    /// A parse failure leaves the file untouched; the caller releases the
    /// claim and the item is retried on the next scan.
    pub fn read(&self, claim: &Claim) -> Result<QueueItem> {
        let path = claim.item_path();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::Vanished(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        QueueItem::from_slice(&bytes).map_err(|source| StoreError::MalformedItem {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Deletes a claimed item after successful delivery.
    pub fn remove(&self, claim: &Claim) -> Result<()> {
        match std::fs::remove_file(claim.item_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves a claimed item into `target`, keeping its file name.
    ///
    /// The destination's lock marker is held for the duration of the rename.
    /// If another worker already holds it, the item at the destination is in
    /// flight and must not be replaced: nothing moves and the caller gets
    /// [`EscalateOutcome::TargetClaimed`].
    ///
    /// When `target` is this same store the rename is onto itself and the item
    /// simply stays queued.
    pub fn escalate(&self, claim: &Claim, target: &QueueStore) -> Result<EscalateOutcome> {
        let destination = target.dir.join(claim.file_name());
        if destination == claim.item_path() {
            return Ok(EscalateOutcome::Unchanged(destination));
        }

        let target_lock = lock_path_for(&destination);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target_lock)
        {
            Ok(file) => drop(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(
                    store = %target.kind,
                    file = %claim.file_name(),
                    "Destination is claimed, not escalating"
                );
                return Ok(EscalateOutcome::TargetClaimed);
            }
            Err(e) => return Err(e.into()),
        }

        let moved = move_and_sync(claim.item_path(), &destination, &target.dir, &self.dir);
        let unlocked = std::fs::remove_file(&target_lock);
        moved?;
        unlocked?;
        Ok(EscalateOutcome::Moved(destination))
    }

    /// Deletes the lock marker of a claim, making the item claimable again
    /// if it is still in this store.
    pub fn release(&self, claim: Claim) -> Result<()> {
        match std::fs::remove_file(&claim.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    store = %self.kind,
                    lock = %claim.lock_path.display(),
                    "Lock marker was already gone on release"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every lock marker in the store.
    ///
    /// Markers outlive a crashed process and would lock their items forever.
    /// Call this once at startup, before any worker runs: with workers active
    /// it would delete live claims and allow double processing.
    pub fn clear_stale_locks(&self) -> Result<usize> {
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();

            let is_lock = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(LOCK_SUFFIX));
            if is_lock && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            fsync_dir(&self.dir)?;
            info!(store = %self.kind, removed, "Cleared stale lock markers");
        }

        Ok(removed)
    }
}

fn lock_path_for(item_path: &Path) -> PathBuf {
    let mut name = item_path.as_os_str().to_owned();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

fn move_and_sync(from: &Path, to: &Path, to_dir: &Path, from_dir: &Path) -> io::Result<()> {
    std::fs::rename(from, to)?;
    fsync_dir(to_dir)?;
    fsync_dir(from_dir)
}

fn staging_path_for(item_path: &Path) -> PathBuf {
    let mut name = item_path.as_os_str().to_owned();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}
