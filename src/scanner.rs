//! Scanner module - enumerates a root folder into a pending import batch

use chrono::{DateTime, Utc};
use log::{debug, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::batch::ImportBatch;
use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::models::ImportRecord;

/// Result of enumerating a root folder
#[derive(Debug)]
pub struct ScanOutcome {
    /// New batch with every candidate file as a pending record
    pub batch: ImportBatch,
    /// Directories traversed
    pub total_dirs: u64,
    /// Entries that could not be read
    pub errors: Vec<ImportError>,
    /// Scan duration in milliseconds
    pub duration_ms: u64,
}

impl ScanOutcome {
    /// Get the number of errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Walk the configured root folder and build a pending batch
///
/// Walk errors are collected in the outcome; only a missing root fails.
pub fn scan_folder(config: &ImportConfig) -> Result<ScanOutcome, ImportError> {
    let start = Instant::now();
    let root = &config.root;
    if !root.exists() {
        return Err(ImportError::not_found(root.clone()));
    }

    let mut errors = Vec::new();
    let mut candidates = Vec::new();
    let mut total_dirs = 0u64;

    let walker = WalkDir::new(root)
        .max_depth(config.effective_max_depth())
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // Never filter the root itself, only what is below it
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || entry
                    .file_name()
                    .to_str()
                    .map(|name| !config.should_ignore_dir(name))
                    .unwrap_or(true)
        });

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_dir() {
                    total_dirs += 1;
                    continue;
                }
                if !entry.file_type().is_file() {
                    continue;
                }
                let extension = file_extension(entry.path());
                if config.should_include_extension(&extension) {
                    candidates.push(entry.into_path());
                }
            }
            Err(e) => {
                let denied = e.io_error().map(|io| io.kind())
                    == Some(std::io::ErrorKind::PermissionDenied);
                errors.push(match e.path().map(|p| p.to_path_buf()) {
                    Some(path) if denied => ImportError::permission_denied(path),
                    path => ImportError::io_error(path, e.to_string()),
                });
            }
        }
    }

    debug!("Found {} candidate file(s) under {:?}", candidates.len(), root);

    // Stat in parallel; collect keeps walk order
    let results: Vec<Result<ImportRecord, ImportError>> = candidates
        .par_iter()
        .map(|path| build_record(path, &config.tag_ids))
        .collect();

    let mut records = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(record) => records.push(record),
            Err(err) => errors.push(err),
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Scanned {:?}: {} file(s), {} dir(s), {} error(s) in {}ms",
        root,
        records.len(),
        total_dirs,
        errors.len(),
        duration_ms
    );

    Ok(ScanOutcome {
        batch: ImportBatch::new(root.clone(), config.tag_ids.clone(), records),
        total_dirs,
        errors,
        duration_ms,
    })
}

/// Build a pending record from a file on disk
pub fn build_record(path: &Path, tag_ids: &[String]) -> Result<ImportRecord, ImportError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ImportError::from(e).with_path(path.to_path_buf()))?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| {
            ImportError::io_error(Some(path.to_path_buf()), "file name is not valid UTF-8")
        })?;

    let date_created: DateTime<Utc> = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(ImportRecord::new(
        PathBuf::from(path),
        name,
        file_extension(path),
        metadata.len(),
        date_created,
    )
    .with_tag_ids(tag_ids.to_vec()))
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}
