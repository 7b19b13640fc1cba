//! Progress reporting module for import runs
//!
//! Emits one JSON object per line so an external caller can follow an
//! ingest. Errors are written as soon as a record fails; progress lines are
//! throttled to the configured interval.

use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::batch::{ImportBatch, ImportStats, StatusCounts};
use crate::driver::ProgressObserver;
use crate::error::ImportError;
use crate::models::{ImportRecord, ImportStatus};

/// Start message sent when an ingest begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Batch id
    pub batch: String,
    /// Root folder of the batch
    pub root: String,
    /// Records in the batch
    #[serde(rename = "tr")]
    pub total_records: usize,
    /// Records still to import
    #[serde(rename = "pr")]
    pub pending_records: usize,
    /// Bytes in the batch
    #[serde(rename = "tb")]
    pub total_bytes: u64,
}

impl StartMessage {
    /// Create a new start message
    pub fn new(seq: u64, ts: u64, batch: &ImportBatch, stats: &ImportStats) -> Self {
        Self {
            msg_type: "start",
            seq,
            ts,
            batch: batch.id.clone(),
            root: batch.root_folder_path.to_string_lossy().to_string(),
            total_records: stats.total_records,
            pending_records: stats.total_records - stats.settled_records,
            total_bytes: stats.total_bytes,
        }
    }
}

/// Progress message sent while records settle
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Settled records
    #[serde(rename = "s")]
    pub settled: usize,
    /// Records in the batch
    #[serde(rename = "tr")]
    pub total: usize,
    /// Bytes of settled records
    #[serde(rename = "b")]
    pub completed_bytes: u64,
    /// Bytes in the batch
    #[serde(rename = "tb")]
    pub total_bytes: u64,
    /// Bytes per second
    #[serde(rename = "r")]
    pub rate: f64,
    /// Most recently settled file
    pub file: String,
    /// Elapsed time in milliseconds
    pub ms: u64,
    /// Estimated remaining time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
}

impl ProgressMessage {
    /// Create a new progress message
    pub fn new(seq: u64, ts: u64, record: &ImportRecord, stats: &ImportStats) -> Self {
        Self {
            msg_type: "p",
            seq,
            ts,
            settled: stats.settled_records,
            total: stats.total_records,
            completed_bytes: stats.completed_bytes,
            total_bytes: stats.total_bytes,
            rate: stats.rate_in_bytes,
            file: record.path.to_string_lossy().to_string(),
            ms: stats.elapsed_ms,
            eta_ms: stats.estimated_remaining_ms(),
        }
    }
}

/// Error message sent when a record fails
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    /// Message type identifier ("err" for error)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Error type/category
    pub error_type: String,
    /// Error message description
    pub message: String,
    /// Path that caused the error (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorProgressMessage {
    /// Create a new error progress message
    pub fn new(
        seq: u64,
        ts: u64,
        error_type: String,
        message: String,
        path: Option<String>,
    ) -> Self {
        Self {
            msg_type: "err",
            seq,
            ts,
            error_type,
            message,
            path,
        }
    }
}

/// Done message sent once the queue has drained
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Records imported
    #[serde(rename = "cf")]
    pub complete: usize,
    /// Records already in the library
    #[serde(rename = "uf")]
    pub duplicate: usize,
    /// Records whose source was gone
    #[serde(rename = "df")]
    pub deleted: usize,
    /// Records that failed
    #[serde(rename = "ec")]
    pub error_count: usize,
    /// Records left pending (cancelled)
    #[serde(rename = "pf")]
    pub pending: usize,
    /// Whether every record settled
    pub complete_batch: bool,
    /// Total ingest duration in milliseconds
    pub ms: u64,
}

impl DoneMessage {
    /// Create a new done message
    pub fn new(
        seq: u64,
        ts: u64,
        counts: &StatusCounts,
        complete_batch: bool,
        ms: u64,
    ) -> Self {
        Self {
            msg_type: "done",
            seq,
            ts,
            complete: counts.complete,
            duplicate: counts.duplicate,
            deleted: counts.deleted,
            error_count: counts.error,
            pending: counts.pending,
            complete_batch,
            ms,
        }
    }
}

/// Progress reporter writing JSON lines, stderr by default
///
/// Implements [`ProgressObserver`] so it can be handed straight to an
/// [`ImportDriver`](crate::driver::ImportDriver).
pub struct ProgressReporter {
    /// Whether progress reporting is enabled
    enabled: bool,
    /// Reporting interval in milliseconds
    interval_ms: u64,
    /// Last progress line, `None` until the first one
    last_report: Mutex<Option<Instant>>,
    /// Sequence number for messages
    seq: AtomicU64,
    /// Start time of the reporter
    start_time: Instant,
    /// Status counts of the batch being ingested
    counts: Mutex<StatusCounts>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ProgressReporter {
    /// Create a reporter writing to stderr
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self::with_writer(enabled, interval_ms, Box::new(std::io::stderr()))
    }

    /// Create a reporter writing to `out`
    pub fn with_writer(enabled: bool, interval_ms: u64, out: Box<dyn Write + Send>) -> Self {
        Self {
            enabled,
            interval_ms,
            last_report: Mutex::new(None),
            seq: AtomicU64::new(0),
            start_time: Instant::now(),
            counts: Mutex::new(StatusCounts::default()),
            out: Mutex::new(out),
        }
    }

    /// Check if enough time has passed since the last progress line
    pub fn should_report(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match *lock(&self.last_report) {
            Some(last) => last.elapsed().as_millis() as u64 >= self.interval_ms,
            None => true,
        }
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get the current timestamp in milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Write a serializable message as one JSON line
    pub fn emit<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            let mut out = lock(&self.out);
            writeln!(out, "{}", json).ok();
            out.flush().ok();
        }
    }

    /// Report an error immediately (ignores interval timing)
    pub fn report_error(&self, error: &ImportError) {
        if !self.enabled {
            return;
        }

        let msg = ErrorProgressMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            format!("{:?}", error.kind),
            error.message.clone(),
            error.path.as_ref().map(|p| p.to_string_lossy().to_string()),
        );

        self.emit(&msg);
    }

    fn count_settled(&self, status: ImportStatus) {
        let mut counts = lock(&self.counts);
        counts.pending = counts.pending.saturating_sub(1);
        match status {
            ImportStatus::Complete => counts.complete += 1,
            ImportStatus::Duplicate => counts.duplicate += 1,
            ImportStatus::Deleted => counts.deleted += 1,
            ImportStatus::Error => counts.error += 1,
            ImportStatus::Pending => counts.pending += 1,
        }
    }
}

impl ProgressObserver for ProgressReporter {
    fn on_started(&self, batch: &ImportBatch, stats: &ImportStats) {
        *lock(&self.counts) = batch.counts();
        if !self.enabled {
            return;
        }
        let msg = StartMessage::new(self.next_seq(), self.current_timestamp(), batch, stats);
        self.emit(&msg);
    }

    fn on_record_settled(&self, record: &ImportRecord, stats: &ImportStats) {
        self.count_settled(record.status);
        if !self.enabled {
            return;
        }

        if record.status == ImportStatus::Error {
            let message = record
                .error_msg
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            let msg = ErrorProgressMessage::new(
                self.next_seq(),
                self.current_timestamp(),
                "RecordFailed".to_string(),
                message,
                Some(record.path.to_string_lossy().to_string()),
            );
            self.emit(&msg);
        }

        if !self.should_report() {
            return;
        }
        let msg = ProgressMessage::new(self.next_seq(), self.current_timestamp(), record, stats);
        self.emit(&msg);
        *lock(&self.last_report) = Some(Instant::now());
    }

    fn on_drained(&self, stats: &ImportStats, is_complete: bool) {
        if !self.enabled {
            return;
        }
        let counts = *lock(&self.counts);
        let msg = DoneMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            &counts,
            is_complete,
            stats.elapsed_ms,
        );
        self.emit(&msg);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
