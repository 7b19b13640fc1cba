//! Error types for the import engine

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur while importing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportErrorKind {
    /// A unit of work rejected its own future
    TaskRejected,
    /// The task never ran because its queue was cancelled
    Cancelled,
    /// A record was settled twice (driver defect, never user-facing)
    DoubleSettlement,
    /// A unit of work exceeded its per-task timeout
    TimedOut,
    /// Configuration failed validation
    InvalidConfig,
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// I/O error during file operations
    IoError,
    /// Database operation failed
    DatabaseError,
    /// Hash computation failed
    HashError,
    /// Unknown error
    Unknown,
}

/// Represents an error that occurred during an import
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ImportError {
    /// The kind of error
    pub kind: ImportErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ImportError {
    /// Create a new import error
    pub fn new(kind: ImportErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a task rejection error
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ImportErrorKind::TaskRejected, None, message)
    }

    /// Create a cancellation error
    pub fn cancelled() -> Self {
        Self::new(ImportErrorKind::Cancelled, None, "cancelled before start")
    }

    /// Create a double settlement error for the given record
    pub fn double_settlement(path: PathBuf) -> Self {
        Self::new(
            ImportErrorKind::DoubleSettlement,
            Some(path.clone()),
            format!("record already settled: {:?}", path),
        )
    }

    /// Create a timeout error
    pub fn timed_out(path: PathBuf, after_ms: u64) -> Self {
        Self::new(
            ImportErrorKind::TimedOut,
            Some(path),
            format!("timed out after {}ms", after_ms),
        )
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ImportErrorKind::InvalidConfig, None, message)
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::new(
            ImportErrorKind::PermissionDenied,
            Some(path.clone()),
            format!("Permission denied: {:?}", path),
        )
    }

    /// Create a not found error
    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            ImportErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }

    /// Create an I/O error
    pub fn io_error(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(ImportErrorKind::IoError, path, message)
    }

    /// Create a database error
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ImportErrorKind::DatabaseError, None, message)
    }

    /// Create a hash computation error
    pub fn hash_error(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ImportErrorKind::HashError, Some(path), message)
    }

    /// Attach a path if the error does not carry one yet
    pub fn with_path(mut self, path: PathBuf) -> Self {
        if self.path.is_none() {
            self.path = Some(path);
        }
        self
    }

    /// Whether this error is an invariant violation that must abort the ingest
    pub fn is_fatal(&self) -> bool {
        self.kind == ImportErrorKind::DoubleSettlement
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ImportErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ImportErrorKind::NotFound,
            _ => ImportErrorKind::IoError,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database_error(err.to_string())
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_config(err.to_string())
    }
}
