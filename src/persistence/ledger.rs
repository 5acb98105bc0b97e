//! Append-only summary ledger of delivered payments.
//!
//! The ledger uses JSON Lines: one canonical [`QueueItem`] per line. Writers
//! share one process-wide critical section, so records never interleave.
//! Readers may run concurrently with writers and see a prefix of the file.
//!
//! # Crash Safety
//!
//! Every append is fsynced before the lock is dropped. A crash mid-write can
//! still leave a partial final line; [`SummaryLedger::open`] truncates it, and
//! readers never yield a line that lacks its terminating newline.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use super::fsync::fsync_file;
use crate::types::QueueItem;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// The shared append-only record of successfully delivered items.
///
/// Clone an `Arc<SummaryLedger>` into every worker; the internal mutex is
/// the single write section for the whole process.
#[derive(Debug)]
pub struct SummaryLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SummaryLedger {
    /// Opens the ledger at `path`, creating it (and its parent directory) if
    /// missing and truncating a torn trailing line left by a crash.
    ///
    /// Must not run concurrently with appends from another ledger instance on
    /// the same path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;

        let truncated = repair_torn_tail(&path)?;
        if truncated > 0 {
            warn!(
                ledger = %path.display(),
                bytes = truncated,
                "Truncated partial ledger record left by an interrupted write"
            );
        }

        Ok(SummaryLedger {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record for a delivered item.
    ///
    /// The file is opened in append mode, written, synced, and closed inside
    /// the write section.
    pub fn append(&self, item: &QueueItem) -> Result<()> {
        let mut line = item.to_canonical_json()?;
        line.push('\n');

        // A poisoned lock only means another writer panicked; the file is
        // still append-only, so keep going.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        fsync_file(&file)?;
        Ok(())
    }

    /// Reads every complete record and parses it back into an item.
    pub fn records(&self) -> Result<Vec<QueueItem>> {
        stream_all(&self.path)?
            .map(|line| Ok(serde_json::from_str(&line?)?))
            .collect()
    }
}

/// Opens a line reader over the ledger at `path`.
///
/// A missing ledger reads as empty.
pub fn stream_all(path: &Path) -> Result<LedgerRecords> {
    let reader = match File::open(path) {
        Ok(file) => Some(BufReader::new(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    Ok(LedgerRecords { reader })
}

/// Iterator over raw ledger records, one JSON object per item.
///
/// Yields only newline-terminated lines, so a record still being written by
/// a concurrent append is never returned half-finished.
pub struct LedgerRecords {
    reader: Option<BufReader<File>>,
}

impl Iterator for LedgerRecords {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(_) if !line.ends_with('\n') => {
                    self.reader = None;
                    return None;
                }
                Ok(_) => {
                    let record = line.trim();
                    if record.is_empty() {
                        continue;
                    }
                    return Some(Ok(record.to_string()));
                }
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/// Truncates the file after its last newline. Returns the bytes removed.
fn repair_torn_tail(path: &Path) -> Result<u64> {
    let bytes = std::fs::read(path)?;
    let valid_len = match bytes.iter().rposition(|b| *b == b'\n') {
        Some(pos) => pos as u64 + 1,
        None => 0,
    };
    let file_len = bytes.len() as u64;

    if valid_len < file_len {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        fsync_file(&file)?;
    }

    Ok(file_len - valid_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentId;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn item(id: &str, amount: &str) -> QueueItem {
        QueueItem::new(PaymentId::parse(id).unwrap(), amount)
    }

    #[test]
    fn open_creates_file_and_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("summary.json");

        let ledger = SummaryLedger::open(&path).unwrap();
        assert!(path.exists());
        assert!(ledger.records().unwrap().is_empty());
    }

    #[test]
    fn append_writes_one_json_line() {
        let dir = tempdir().unwrap();
        let ledger = SummaryLedger::open(dir.path().join("summary.json")).unwrap();

        ledger.append(&item("p2", "5.00")).unwrap();

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content, "{\"id\":\"p2\",\"amount\":\"5.00\"}\n");
    }

    #[test]
    fn records_round_trip_in_append_order() {
        let dir = tempdir().unwrap();
        let ledger = SummaryLedger::open(dir.path().join("summary.json")).unwrap();

        ledger.append(&item("a", "1")).unwrap();
        ledger.append(&item("b", "2")).unwrap();

        let ids: Vec<_> = ledger
            .records()
            .unwrap()
            .into_iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn stream_all_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let records: Vec<_> = stream_all(&dir.path().join("nope.json")).unwrap().collect();
        assert!(records.is_empty());
    }

    #[test]
    fn stream_all_skips_unterminated_tail_and_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        std::fs::write(
            &path,
            "{\"id\":\"a\",\"amount\":\"1\"}\n\n{\"id\":\"b\",\"amount\":\"2\"}\n{\"id\":\"c\",\"am",
        )
        .unwrap();

        let records: Vec<_> = stream_all(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            records,
            vec![
                "{\"id\":\"a\",\"amount\":\"1\"}".to_string(),
                "{\"id\":\"b\",\"amount\":\"2\"}".to_string(),
            ]
        );
    }

    #[test]
    fn open_truncates_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let valid = "{\"id\":\"a\",\"amount\":\"1\"}\n";
        std::fs::write(&path, format!("{valid}{{\"id\":\"b\",\"amo")).unwrap();

        let ledger = SummaryLedger::open(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), valid);
        ledger.append(&item("c", "3")).unwrap();
        let ids: Vec<_> = ledger
            .records()
            .unwrap()
            .into_iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn open_truncates_file_without_any_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        std::fs::write(&path, "{\"id\":\"torn").unwrap();

        SummaryLedger::open(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(SummaryLedger::open(dir.path().join("summary.json")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let mut record = item(&format!("t{t}-{i}"), "9.99");
                        record
                            .extra
                            .insert("padding".into(), serde_json::json!("x".repeat(512)));
                        ledger.append(&record).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 200);
        let mut ids: Vec<_> = records.iter().map(|r| r.id.to_string()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 200);
    }

    proptest! {
        /// Cutting the file at any byte and reopening leaves a parseable
        /// prefix of what was written.
        #[test]
        fn crash_at_any_byte_recovers_prefix(
            amounts in prop::collection::vec("[0-9]{1,5}\\.[0-9]{2}", 1..10),
            cut_ratio in 0.0f64..1.0,
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("summary.json");
            let ledger = SummaryLedger::open(&path).unwrap();
            let written: Vec<_> = amounts
                .iter()
                .enumerate()
                .map(|(i, a)| item(&format!("p{i}"), a))
                .collect();
            for record in &written {
                ledger.append(record).unwrap();
            }
            drop(ledger);

            let len = std::fs::metadata(&path).unwrap().len();
            let cut = (len as f64 * cut_ratio) as u64;
            OpenOptions::new().write(true).open(&path).unwrap().set_len(cut).unwrap();

            let recovered = SummaryLedger::open(&path).unwrap().records().unwrap();
            prop_assert!(recovered.len() <= written.len());
            for (got, expected) in recovered.iter().zip(written.iter()) {
                prop_assert_eq!(got, expected);
            }
        }
    }
}
