//! Import batch and its derived state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{ImportRecord, ImportStatus};

/// Aggregate status of a set of records
///
/// `Error` dominates, then `Duplicate`, then `Pending` (any pending record
/// or a batch not yet marked complete), otherwise `Complete`.
pub fn aggregate_status(records: &[ImportRecord], completed: bool) -> ImportStatus {
    let has = |status: ImportStatus| records.iter().any(|r| r.status == status);

    if has(ImportStatus::Error) {
        ImportStatus::Error
    } else if has(ImportStatus::Duplicate) {
        ImportStatus::Duplicate
    } else if has(ImportStatus::Pending) || !completed {
        ImportStatus::Pending
    } else {
        ImportStatus::Complete
    }
}

/// Ordered set of records sharing a root folder and import options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    /// Batch id
    pub id: String,
    /// Folder the records were enumerated from
    pub root_folder_path: PathBuf,
    /// Tags applied to every record of the batch
    #[serde(default)]
    pub tag_ids: Vec<String>,
    /// Set when the driver starts submitting work
    pub started_at: Option<DateTime<Utc>>,
    /// Set once every record has settled
    pub completed_at: Option<DateTime<Utc>>,
    /// Records in enumeration order
    pub records: Vec<ImportRecord>,
}

impl ImportBatch {
    /// Create a new batch with a fresh id
    pub fn new(root_folder_path: PathBuf, tag_ids: Vec<String>, records: Vec<ImportRecord>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            root_folder_path,
            tag_ids,
            started_at: None,
            completed_at: None,
            records,
        }
    }

    /// Derived batch status, computed on every call
    pub fn status(&self) -> ImportStatus {
        aggregate_status(&self.records, self.completed_at.is_some())
    }

    /// Count records per status
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in &self.records {
            counts.add(record.status);
        }
        counts
    }

    /// Indices of records still waiting to be processed
    pub fn pending_indices(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_settled())
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether any record is still pending
    pub fn has_pending(&self) -> bool {
        self.records.iter().any(|r| !r.is_settled())
    }

    /// Total size of every record
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.size).sum()
    }

    /// Size of every settled record
    pub fn completed_bytes(&self) -> u64 {
        self.records
            .iter()
            .filter(|r| r.is_settled())
            .map(|r| r.size)
            .sum()
    }

    /// Set `completed_at` if every record has settled
    ///
    /// Returns whether the batch is now complete.
    pub fn mark_completed_if_settled(&mut self, now: DateTime<Utc>) -> bool {
        if self.has_pending() {
            return false;
        }
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        true
    }

    /// Put every failed record back to pending for a retry
    ///
    /// Returns the number of records reset.
    pub fn reset_failed(&mut self) -> usize {
        self.reset_where(|r| r.status == ImportStatus::Error)
    }

    /// Put the user-selected records back to pending
    pub fn reset_paths(&mut self, paths: &[PathBuf]) -> usize {
        self.reset_where(|r| r.is_settled() && paths.iter().any(|p| p == &r.path))
    }

    fn reset_where(&mut self, select: impl Fn(&ImportRecord) -> bool) -> usize {
        let mut reset = 0;
        for record in self.records.iter_mut() {
            if select(record) {
                *record = record.reset();
                reset += 1;
            }
        }
        if reset > 0 {
            self.completed_at = None;
        }
        reset
    }

    /// Find a record by source path
    pub fn record(&self, path: &Path) -> Option<&ImportRecord> {
        self.records.iter().find(|r| r.path == path)
    }

    /// Progress snapshot over the whole batch
    pub fn stats(&self, elapsed: Duration) -> ImportStats {
        let counts = self.counts();
        ImportStats::new(
            self.completed_bytes(),
            self.total_bytes(),
            elapsed,
            counts.settled(),
            counts.total(),
        )
    }
}

/// Number of records in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub complete: usize,
    pub duplicate: usize,
    pub deleted: usize,
    pub error: usize,
}

impl StatusCounts {
    fn add(&mut self, status: ImportStatus) {
        match status {
            ImportStatus::Pending => self.pending += 1,
            ImportStatus::Complete => self.complete += 1,
            ImportStatus::Duplicate => self.duplicate += 1,
            ImportStatus::Deleted => self.deleted += 1,
            ImportStatus::Error => self.error += 1,
        }
    }

    /// Records in a terminal status
    pub fn settled(&self) -> usize {
        self.complete + self.duplicate + self.deleted + self.error
    }

    /// All records
    pub fn total(&self) -> usize {
        self.settled() + self.pending
    }
}

/// Progress snapshot, recomputed after each settlement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportStats {
    /// Bytes of settled records
    pub completed_bytes: u64,
    /// Bytes of all records
    pub total_bytes: u64,
    /// Time since the ingest started, in milliseconds
    pub elapsed_ms: u64,
    /// Throughput in bytes per second
    pub rate_in_bytes: f64,
    /// Records in a terminal status
    pub settled_records: usize,
    /// All records in the batch
    pub total_records: usize,
}

impl ImportStats {
    /// Build a snapshot and derive the rate
    pub fn new(
        completed_bytes: u64,
        total_bytes: u64,
        elapsed: Duration,
        settled_records: usize,
        total_records: usize,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate_in_bytes = if secs > 0.0 {
            completed_bytes as f64 / secs
        } else {
            0.0
        };
        Self {
            completed_bytes,
            total_bytes,
            elapsed_ms: elapsed.as_millis() as u64,
            rate_in_bytes,
            settled_records,
            total_records,
        }
    }

    /// Estimated time left at the current rate
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        if self.completed_bytes == 0 || self.elapsed_ms == 0 {
            return None;
        }
        let rate = self.completed_bytes as f64 / self.elapsed_ms as f64;
        let remaining = self.total_bytes.saturating_sub(self.completed_bytes);
        Some((remaining as f64 / rate) as u64)
    }
}
