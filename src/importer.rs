//! Library importer - the unit of work that brings one file into the library

use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::chain::SequentialChain;
use crate::config::ImportConfig;
use crate::db::LibraryDatabase;
use crate::driver::UnitOfWork;
use crate::error::ImportError;
use crate::models::{ImportRecord, RecordUpdate};
use crate::queue::TaskError;

/// Imports files into a [`LibraryDatabase`]
///
/// Hashing runs concurrently across records. The duplicate lookup and the
/// insert that follows it run on a [`SequentialChain`], so two identical
/// files in one batch can never both be inserted. A call that is dropped
/// (for example by the driver's task timeout) before its write reaches the
/// database skips the write, so a retry does not see its own earlier insert.
pub struct LibraryImporter {
    db: Arc<Mutex<LibraryDatabase>>,
    writes: SequentialChain,
    compute_hash: bool,
    large_file_threshold: u64,
    tag_ids: Vec<String>,
}

impl LibraryImporter {
    /// Create an importer using the hashing and tag options of `config`
    pub fn new(db: Arc<Mutex<LibraryDatabase>>, config: &ImportConfig) -> Self {
        Self {
            db,
            writes: SequentialChain::new(),
            compute_hash: config.compute_hash,
            large_file_threshold: config.large_file_threshold,
            tag_ids: config.tag_ids.clone(),
        }
    }

    /// Replace the batch-level tags
    pub fn with_tag_ids(mut self, tag_ids: Vec<String>) -> Self {
        self.tag_ids = tag_ids;
        self
    }

    /// Shared handle to the library database
    pub fn database(&self) -> Arc<Mutex<LibraryDatabase>> {
        Arc::clone(&self.db)
    }

    fn merged_tags(&self, record: &ImportRecord) -> Vec<String> {
        let mut tags = record.tag_ids.clone();
        for tag in &self.tag_ids {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }

    async fn hash(&self, path: &Path) -> Result<Option<(String, bool)>, ImportError> {
        if !self.compute_hash {
            return Ok(None);
        }
        let owned = path.to_path_buf();
        let threshold = self.large_file_threshold;
        let hashed = tokio::task::spawn_blocking(move || compute_file_hash(&owned, threshold))
            .await
            .map_err(|e| ImportError::hash_error(path.to_path_buf(), e.to_string()))??;
        Ok(Some(hashed))
    }
}

#[async_trait]
impl UnitOfWork for LibraryImporter {
    async fn process(&self, record: ImportRecord) -> Result<RecordUpdate, ImportError> {
        match tokio::fs::metadata(&record.path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Source file is gone: {:?}", record.path);
                return Ok(RecordUpdate::deleted());
            }
            Err(e) => return Err(ImportError::from(e).with_path(record.path.clone())),
        }

        let hashed = self.hash(&record.path).await?;
        let tags = self.merged_tags(&record);
        let db = Arc::clone(&self.db);
        let abandoned = AbandonOnDrop::default();
        let flag = Arc::clone(&abandoned.0);

        let handle = self.writes.push(move || async move {
            tokio::task::spawn_blocking(move || store_file(&db, &record, hashed, &tags, &flag))
                .await
                .unwrap_or_else(|e| Err(ImportError::database_error(e.to_string())))
        });

        let result = handle.await.map_err(|err| match err {
            TaskError::Rejected(err) => err,
            TaskError::Cancelled => ImportError::cancelled(),
            TaskError::Panicked(msg) => ImportError::database_error(msg),
        });
        drop(abandoned);
        result
    }
}

/// Flag raised once the importing call has gone away
#[derive(Default)]
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl fmt::Debug for LibraryImporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryImporter")
            .field("compute_hash", &self.compute_hash)
            .field("large_file_threshold", &self.large_file_threshold)
            .field("tag_ids", &self.tag_ids)
            .finish_non_exhaustive()
    }
}

/// Duplicate check and insert, run on the write chain
fn store_file(
    db: &Mutex<LibraryDatabase>,
    record: &ImportRecord,
    hashed: Option<(String, bool)>,
    tags: &[String],
    abandoned: &AtomicBool,
) -> Result<RecordUpdate, ImportError> {
    let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
    if abandoned.load(Ordering::Acquire) {
        debug!("Skipping write for abandoned import of {:?}", record.path);
        return Err(ImportError::cancelled());
    }

    if let Some((hash, _)) = &hashed {
        if let Some(existing) = db.find_by_hash(hash)? {
            debug!("{:?} duplicates library file {}", record.path, existing);
            return Ok(RecordUpdate::duplicate()
                .with_file_id(existing)
                .with_hash(hash.clone()));
        }
    }

    let (hash, is_partial) = match hashed {
        Some((hash, is_partial)) => (Some(hash), is_partial),
        None => (None, false),
    };
    let file_id = db.insert_file(record, hash.as_deref(), is_partial, tags)?;

    let mut update = RecordUpdate::complete()
        .with_file_id(file_id)
        .with_tag_ids(tags.to_vec());
    if let Some(hash) = hash {
        update = update.with_hash(hash);
    }
    Ok(update)
}

/// Compute file hash (MD5)
/// For large files, compute partial hash (first 1MB + last 1MB)
pub fn compute_file_hash(
    path: &Path,
    large_file_threshold: u64,
) -> Result<(String, bool), ImportError> {
    use md5::{Digest, Md5};
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    let fail = |e: std::io::Error| ImportError::hash_error(PathBuf::from(path), e.to_string());

    let mut file = File::open(path).map_err(fail)?;
    let file_size = file.metadata().map_err(fail)?.len();

    let mut hasher = Md5::new();

    if file_size <= large_file_threshold {
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).map_err(fail)?;
        hasher.update(&buffer);
        Ok((format!("{:x}", hasher.finalize()), false))
    } else {
        let chunk_size = 1024 * 1024;
        let mut buffer = vec![0u8; chunk_size];

        let bytes_read = file.read(&mut buffer).map_err(fail)?;
        hasher.update(&buffer[..bytes_read]);

        if file_size > chunk_size as u64 {
            file.seek(SeekFrom::End(-(chunk_size as i64))).map_err(fail)?;
            let bytes_read = file.read(&mut buffer).map_err(fail)?;
            hasher.update(&buffer[..bytes_read]);
        }

        Ok((format!("{:x}", hasher.finalize()), true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ImportDriver;
    use crate::error::ImportErrorKind;
    use crate::models::ImportStatus;
    use crate::queue::QueueConfig;
    use crate::scanner::scan_folder;
    use std::fs;
    use std::time::Duration;

    fn setup(dir: &Path) -> (Arc<Mutex<LibraryDatabase>>, ImportConfig) {
        let db = Arc::new(Mutex::new(LibraryDatabase::open_memory().unwrap()));
        let config = ImportConfig::builder()
            .root(dir.to_path_buf())
            .add_tag("batch-tag")
            .concurrency(2)
            .build();
        (db, config)
    }

    #[test]
    fn test_compute_file_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"hello").unwrap();

        let (hash, partial) = compute_file_hash(&path, 1024).unwrap();
        assert_eq!(hash, "5d41402abc4b2a76b9719d911017c592");
        assert!(!partial);

        let (_, partial) = compute_file_hash(&path, 2).unwrap();
        assert!(partial);

        let err = compute_file_hash(&dir.path().join("missing"), 1024).unwrap_err();
        assert_eq!(err.kind, ImportErrorKind::HashError);
    }

    #[tokio::test]
    async fn test_process_inserts_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"pixels").unwrap();
        let (db, config) = setup(dir.path());
        let importer = LibraryImporter::new(Arc::clone(&db), &config);

        let record = crate::scanner::build_record(&path, &["own-tag".to_string()]).unwrap();
        let update = importer.process(record.clone()).await.unwrap();
        let settled = record.settle(update).unwrap();

        assert_eq!(settled.status, ImportStatus::Complete);
        assert!(settled.hash.is_some());
        assert_eq!(
            settled.tag_ids,
            vec!["own-tag".to_string(), "batch-tag".to_string()]
        );
        let file_id = settled.file_id.unwrap();
        let db = db.lock().unwrap();
        assert_eq!(db.file_count().unwrap(), 1);
        assert_eq!(
            db.file_tags(&file_id).unwrap(),
            vec!["batch-tag".to_string(), "own-tag".to_string()]
        );
    }

    #[tokio::test]
    async fn test_process_missing_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.jpg");
        fs::write(&path, b"x").unwrap();
        let record = crate::scanner::build_record(&path, &[]).unwrap();
        fs::remove_file(&path).unwrap();

        let (db, config) = setup(dir.path());
        let importer = LibraryImporter::new(Arc::clone(&db), &config);
        let update = importer.process(record).await.unwrap();
        assert_eq!(update.status, Some(ImportStatus::Deleted));
        assert_eq!(db.lock().unwrap().file_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_process_skips_its_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"pixels").unwrap();
        let (db, config) = setup(dir.path());
        let importer = LibraryImporter::new(Arc::clone(&db), &config);
        let record = crate::scanner::build_record(&path, &[]).unwrap();

        // Hold the write chain so the insert is still queued when the call is dropped
        let (release, blocked) = tokio::sync::oneshot::channel::<()>();
        let blocker = importer.writes.push(move || async move {
            let _ = blocked.await;
            Ok::<_, ImportError>(())
        });

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), importer.process(record.clone())).await;
        assert!(timed_out.is_err());

        release.send(()).unwrap();
        blocker.await.unwrap();
        importer.writes.drain().await;
        assert_eq!(db.lock().unwrap().file_count().unwrap(), 0);

        // Retrying the same record imports it instead of matching itself
        let update = importer.process(record).await.unwrap();
        assert_eq!(update.status, Some(ImportStatus::Complete));
        assert_eq!(db.lock().unwrap().file_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ingest_detects_duplicates_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"same bytes").unwrap();
        fs::write(dir.path().join("b.jpg"), b"same bytes").unwrap();
        fs::write(dir.path().join("c.jpg"), b"other bytes").unwrap();

        let (db, config) = setup(dir.path());
        let batch = scan_folder(&config).unwrap().batch;
        let importer = LibraryImporter::new(Arc::clone(&db), &config);
        let driver = ImportDriver::new(config.queue.clone(), importer).unwrap();

        let batch = driver.ingest(batch).await.unwrap();
        let counts = batch.counts();
        assert_eq!(counts.complete, 2);
        assert_eq!(counts.duplicate, 1);
        assert_eq!(batch.status(), ImportStatus::Duplicate);
        assert!(batch.completed_at.is_some());
        assert_eq!(db.lock().unwrap().file_count().unwrap(), 2);

        let dup = batch
            .records
            .iter()
            .find(|r| r.status == ImportStatus::Duplicate)
            .unwrap();
        let original = batch
            .records
            .iter()
            .find(|r| r.status == ImportStatus::Complete && r.hash == dup.hash)
            .unwrap();
        assert_eq!(dup.file_id, original.file_id);
    }

    #[tokio::test]
    async fn test_without_hash_no_duplicate_detection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"same").unwrap();
        fs::write(dir.path().join("b.jpg"), b"same").unwrap();

        let (db, config) = setup(dir.path());
        let config = crate::config::ImportConfigBuilder::from_config(config)
            .compute_hash(false)
            .build();
        let batch = scan_folder(&config).unwrap().batch;
        let importer = LibraryImporter::new(Arc::clone(&db), &config);
        let driver = ImportDriver::new(QueueConfig::new(1), importer).unwrap();

        let batch = driver.ingest(batch).await.unwrap();
        assert_eq!(batch.counts().complete, 2);
        assert!(batch.records.iter().all(|r| r.hash.is_none()));
        assert_eq!(db.lock().unwrap().file_count().unwrap(), 2);
    }
}
