//! Import record data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ImportError;

/// Status of a single import record
///
/// A record starts `Pending` and moves to exactly one terminal status when
/// its unit of work settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportStatus {
    /// Not yet processed (or never started because the batch was cancelled)
    #[default]
    Pending,
    /// Imported into the library
    Complete,
    /// Content already present in the library
    Duplicate,
    /// Source file vanished before it could be imported
    Deleted,
    /// The unit of work failed
    Error,
}

impl ImportStatus {
    /// Every status, in declaration order
    pub const ALL: [ImportStatus; 5] = [
        ImportStatus::Pending,
        ImportStatus::Complete,
        ImportStatus::Duplicate,
        ImportStatus::Deleted,
        ImportStatus::Error,
    ];

    /// Whether the status is final for the current ingest
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ImportStatus::Pending)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "PENDING",
            ImportStatus::Complete => "COMPLETE",
            ImportStatus::Duplicate => "DUPLICATE",
            ImportStatus::Deleted => "DELETED",
            ImportStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImportStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ImportError::database_error(format!("unknown import status: {}", s)))
    }
}

/// Media type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video files (mp4, mkv, avi, etc.)
    Video,
    /// Image files (jpg, png, webp, etc.)
    Image,
    /// Audio files (mp3, flac, wav, etc.)
    Audio,
    /// Unknown or unsupported media type
    Unknown,
}

impl MediaType {
    /// Infer media type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp4" | "mkv" | "avi" | "wmv" | "flv" | "mov" | "webm" | "m4v" | "ts" | "rmvb" => {
                MediaType::Video
            }
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tiff" | "tif" => MediaType::Image,
            "mp3" | "flac" | "wav" | "aac" | "ogg" | "wma" | "m4a" => MediaType::Audio,
            _ => MediaType::Unknown,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One candidate file and the outcome of importing it
///
/// Records are values: settling one produces a new record with the update
/// overlaid, the original is never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Full path to the source file
    pub path: PathBuf,
    /// File name without path
    pub name: String,
    /// File extension (lowercase, without dot)
    pub extension: String,
    /// File size in bytes
    pub size: u64,
    /// Creation time of the source file
    pub date_created: DateTime<Utc>,
    /// Inferred media type
    pub media_type: MediaType,
    /// Current status
    pub status: ImportStatus,
    /// Library id of the imported (or duplicated) file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Failure message when `status` is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    /// Content hash, when computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Resolved tag ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<String>,
    /// Generated thumbnail paths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thumb_paths: Vec<PathBuf>,
}

impl ImportRecord {
    /// Create a pending record with basic metadata
    pub fn new(
        path: PathBuf,
        name: String,
        extension: String,
        size: u64,
        date_created: DateTime<Utc>,
    ) -> Self {
        let media_type = MediaType::from_extension(&extension);
        Self {
            path,
            name,
            extension,
            size,
            date_created,
            media_type,
            status: ImportStatus::Pending,
            file_id: None,
            error_msg: None,
            hash: None,
            tag_ids: Vec::new(),
            thumb_paths: Vec::new(),
        }
    }

    /// Set the initial tag ids
    pub fn with_tag_ids(mut self, tag_ids: Vec<String>) -> Self {
        self.tag_ids = tag_ids;
        self
    }

    /// Whether the record has settled
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }

    /// Produce the settled version of this record
    ///
    /// Fails with `DoubleSettlement` if the record is already terminal. An
    /// update without a terminal status settles the record `Complete`.
    pub fn settle(&self, update: RecordUpdate) -> Result<ImportRecord, ImportError> {
        if self.is_settled() {
            return Err(ImportError::double_settlement(self.path.clone()));
        }

        let status = update
            .status
            .filter(ImportStatus::is_terminal)
            .unwrap_or(ImportStatus::Complete);

        let error_msg = match status {
            ImportStatus::Error => Some(
                update
                    .error_msg
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            _ => None,
        };

        Ok(ImportRecord {
            status,
            error_msg,
            file_id: update.file_id.or_else(|| self.file_id.clone()),
            hash: update.hash.or_else(|| self.hash.clone()),
            tag_ids: update.tag_ids.unwrap_or_else(|| self.tag_ids.clone()),
            thumb_paths: update
                .thumb_paths
                .unwrap_or_else(|| self.thumb_paths.clone()),
            ..self.clone()
        })
    }

    /// Pending copy for a re-ingest, keeping path and metadata
    pub fn reset(&self) -> ImportRecord {
        ImportRecord {
            status: ImportStatus::Pending,
            file_id: None,
            error_msg: None,
            thumb_paths: Vec::new(),
            ..self.clone()
        }
    }
}

/// Fields a unit of work reports back for its record
///
/// Unset fields keep the record's current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    /// Terminal status to apply
    pub status: Option<ImportStatus>,
    /// Library id of the stored file
    pub file_id: Option<String>,
    /// Failure message
    pub error_msg: Option<String>,
    /// Content hash
    pub hash: Option<String>,
    /// Resolved tag ids
    pub tag_ids: Option<Vec<String>>,
    /// Generated thumbnails
    pub thumb_paths: Option<Vec<PathBuf>>,
}

impl RecordUpdate {
    /// Update with the given status
    pub fn status(status: ImportStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// File was imported
    pub fn complete() -> Self {
        Self::status(ImportStatus::Complete)
    }

    /// File already exists in the library
    pub fn duplicate() -> Self {
        Self::status(ImportStatus::Duplicate)
    }

    /// Source file is gone
    pub fn deleted() -> Self {
        Self::status(ImportStatus::Deleted)
    }

    /// Unit of work failed with a message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some(ImportStatus::Error),
            error_msg: Some(message.into()),
            ..Default::default()
        }
    }

    /// Set the library file id
    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Set the content hash
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Set the resolved tag ids
    pub fn with_tag_ids(mut self, tag_ids: Vec<String>) -> Self {
        self.tag_ids = Some(tag_ids);
        self
    }

    /// Set the thumbnail paths
    pub fn with_thumb_paths(mut self, thumb_paths: Vec<PathBuf>) -> Self {
        self.thumb_paths = Some(thumb_paths);
        self
    }
}
