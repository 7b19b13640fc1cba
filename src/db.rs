//! Database module for the media library and resumable import batches

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::batch::ImportBatch;
use crate::error::ImportError;
use crate::models::{ImportRecord, ImportStatus};

/// Summary row for a stored batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub id: String,
    pub root_folder_path: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub record_count: u64,
}

/// Record row as stored, before status and JSON columns are decoded
struct RecordRow {
    path: String,
    name: String,
    extension: String,
    size: i64,
    date_created: i64,
    status: String,
    file_id: Option<String>,
    error_msg: Option<String>,
    hash: Option<String>,
    tag_ids: String,
    thumb_paths: String,
}

impl RecordRow {
    fn into_record(self) -> Result<ImportRecord, ImportError> {
        let mut record = ImportRecord::new(
            PathBuf::from(self.path),
            self.name,
            self.extension,
            self.size as u64,
            from_millis(Some(self.date_created)).unwrap_or_else(Utc::now),
        );
        record.status = self.status.parse::<ImportStatus>()?;
        record.file_id = self.file_id;
        record.error_msg = self.error_msg;
        record.hash = self.hash;
        record.tag_ids = serde_json::from_str(&self.tag_ids)?;
        record.thumb_paths = serde_json::from_str(&self.thumb_paths)?;
        Ok(record)
    }
}

/// Database manager for the library
pub struct LibraryDatabase {
    conn: Connection,
}

impl LibraryDatabase {
    /// Open or create database
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self, ImportError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), ImportError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                extension TEXT NOT NULL,
                media_type TEXT NOT NULL,
                hash TEXT,
                is_partial_hash INTEGER DEFAULT 0,
                date_created INTEGER NOT NULL,
                imported_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);

            CREATE TABLE IF NOT EXISTS file_tags (
                file_id TEXT NOT NULL,
                tag_id TEXT NOT NULL,
                PRIMARY KEY (file_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS import_batches (
                id TEXT PRIMARY KEY,
                root_folder_path TEXT NOT NULL,
                tag_ids TEXT NOT NULL,
                started_at INTEGER,
                completed_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS import_records (
                batch_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                extension TEXT NOT NULL,
                size INTEGER NOT NULL,
                date_created INTEGER NOT NULL,
                status TEXT NOT NULL,
                file_id TEXT,
                error_msg TEXT,
                hash TEXT,
                tag_ids TEXT NOT NULL,
                thumb_paths TEXT NOT NULL,
                PRIMARY KEY (batch_id, position)
            );
            CREATE INDEX IF NOT EXISTS idx_import_records_status ON import_records(status);
            ",
        )?;
        Ok(())
    }

    /// Look up a library file by content hash
    pub fn find_by_hash(&self, hash: &str) -> Result<Option<String>, ImportError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM files WHERE hash = ?1 LIMIT 1",
                [hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Insert a file and its tags, returning the new file id
    pub fn insert_file(
        &mut self,
        record: &ImportRecord,
        hash: Option<&str>,
        is_partial_hash: bool,
        tag_ids: &[String],
    ) -> Result<String, ImportError> {
        let id = uuid::Uuid::new_v4().to_string();
        let tx = self.conn.transaction()?;
        {
            tx.execute(
                "INSERT INTO files
                 (id, path, name, size, extension, media_type, hash, is_partial_hash, date_created, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    normalize_path(&record.path),
                    record.name,
                    record.size as i64,
                    record.extension,
                    record.media_type.as_str(),
                    hash,
                    is_partial_hash as i32,
                    record.date_created.timestamp_millis(),
                    Utc::now().timestamp_millis(),
                ],
            )?;

            let mut tag_stmt =
                tx.prepare("INSERT OR IGNORE INTO file_tags (file_id, tag_id) VALUES (?1, ?2)")?;
            for tag_id in tag_ids {
                tag_stmt.execute(params![id, tag_id])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    /// Tags attached to a library file
    pub fn file_tags(&self, file_id: &str) -> Result<Vec<String>, ImportError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag_id FROM file_tags WHERE file_id = ?1 ORDER BY tag_id")?;
        let rows = stmt.query_map([file_id], |row| row.get(0))?;

        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    /// Get file count
    pub fn file_count(&self) -> Result<u64, ImportError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Store a batch and replace its records
    pub fn save_batch(&mut self, batch: &ImportBatch) -> Result<(), ImportError> {
        let tx = self.conn.transaction()?;
        {
            tx.execute(
                "INSERT OR REPLACE INTO import_batches
                 (id, root_folder_path, tag_ids, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    batch.id,
                    normalize_path(&batch.root_folder_path),
                    serde_json::to_string(&batch.tag_ids)?,
                    batch.started_at.map(|t| t.timestamp_millis()),
                    batch.completed_at.map(|t| t.timestamp_millis()),
                ],
            )?;

            tx.execute(
                "DELETE FROM import_records WHERE batch_id = ?1",
                [&batch.id],
            )?;

            let mut stmt = tx.prepare(
                "INSERT INTO import_records
                 (batch_id, position, path, name, extension, size, date_created,
                  status, file_id, error_msg, hash, tag_ids, thumb_paths)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for (position, record) in batch.records.iter().enumerate() {
                stmt.execute(params![
                    batch.id,
                    position as i64,
                    record.path.to_string_lossy().to_string(),
                    record.name,
                    record.extension,
                    record.size as i64,
                    record.date_created.timestamp_millis(),
                    record.status.as_str(),
                    record.file_id,
                    record.error_msg,
                    record.hash,
                    serde_json::to_string(&record.tag_ids)?,
                    serde_json::to_string(&record.thumb_paths)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Load a stored batch with its records in order
    pub fn load_batch(&self, id: &str) -> Result<Option<ImportBatch>, ImportError> {
        let header = self
            .conn
            .query_row(
                "SELECT root_folder_path, tag_ids, started_at, completed_at
                 FROM import_batches WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((root, tag_ids, started_at, completed_at)) = header else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT path, name, extension, size, date_created, status,
                    file_id, error_msg, hash, tag_ids, thumb_paths
             FROM import_records WHERE batch_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok(RecordRow {
                path: row.get(0)?,
                name: row.get(1)?,
                extension: row.get(2)?,
                size: row.get(3)?,
                date_created: row.get(4)?,
                status: row.get(5)?,
                file_id: row.get(6)?,
                error_msg: row.get(7)?,
                hash: row.get(8)?,
                tag_ids: row.get(9)?,
                thumb_paths: row.get(10)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }

        Ok(Some(ImportBatch {
            id: id.to_string(),
            root_folder_path: PathBuf::from(root),
            tag_ids: serde_json::from_str(&tag_ids)?,
            started_at: from_millis(started_at),
            completed_at: from_millis(completed_at),
            records,
        }))
    }

    /// List stored batches, newest first
    pub fn list_batches(&self) -> Result<Vec<BatchSummary>, ImportError> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.root_folder_path, b.started_at, b.completed_at,
                    (SELECT COUNT(*) FROM import_records r WHERE r.batch_id = b.id)
             FROM import_batches b
             ORDER BY b.started_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BatchSummary {
                id: row.get(0)?,
                root_folder_path: row.get(1)?,
                started_at: from_millis(row.get(2)?),
                completed_at: from_millis(row.get(3)?),
                record_count: row.get::<_, i64>(4)? as u64,
            })
        })?;

        let mut batches = Vec::new();
        for row in rows {
            batches.push(row?);
        }
        Ok(batches)
    }
}

/// Normalize path separators for cross-platform consistency
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}
