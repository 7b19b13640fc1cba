//! Bounded-concurrency media import engine
//!
//! Enumerates a folder into a resumable import batch, runs one unit of work
//! per file on a bounded task queue and tracks each record through its
//! status state machine.

pub mod batch;
pub mod chain;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod importer;
pub mod models;
pub mod progress;
pub mod queue;
pub mod scanner;

pub use batch::{aggregate_status, ImportBatch, ImportStats, StatusCounts};
pub use chain::SequentialChain;
pub use config::{ImportConfig, ImportConfigBuilder};
pub use db::{BatchSummary, LibraryDatabase};
pub use driver::{apply_update, ImportDriver, NoopObserver, ProgressObserver, UnitOfWork};
pub use error::{ImportError, ImportErrorKind};
pub use importer::LibraryImporter;
pub use models::{ImportRecord, ImportStatus, MediaType, RecordUpdate};
pub use progress::{
    DoneMessage, ErrorProgressMessage, ProgressMessage, ProgressReporter, StartMessage,
};
pub use queue::{DelayRange, QueueConfig, TaskError, TaskHandle, TaskQueue};
pub use scanner::{scan_folder, ScanOutcome};
