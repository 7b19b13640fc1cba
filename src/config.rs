//! Configuration for the import engine

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ImportError;
use crate::queue::{DelayRange, QueueConfig};

/// Default large file threshold (100 MB)
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default max depth for recursive scanning
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Default minimum interval between progress messages
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Configuration for an import run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Folder to enumerate
    pub root: PathBuf,

    /// File extensions to include (whitelist)
    /// If empty, every file is included
    pub extensions: HashSet<String>,

    /// Directory names to ignore
    pub ignore_dirs: HashSet<String>,

    /// Whether to scan subdirectories recursively
    pub recursive: bool,

    /// Maximum depth for recursive scanning
    pub max_depth: usize,

    /// Whether to compute content hashes (needed for duplicate detection)
    pub compute_hash: bool,

    /// Threshold for using partial hash (bytes)
    /// Files larger than this use partial hash (first 1MB + last 1MB)
    pub large_file_threshold: u64,

    /// Task queue options
    pub queue: QueueConfig,

    /// Optional per-file timeout in milliseconds
    pub task_timeout_ms: Option<u64>,

    /// Tags applied to every imported file
    pub tag_ids: Vec<String>,

    /// Library database path
    pub db_path: Option<PathBuf>,

    /// Minimum interval between progress messages
    pub progress_interval_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            extensions: Self::default_extensions(),
            ignore_dirs: Self::default_ignore_dirs(),
            recursive: true,
            max_depth: DEFAULT_MAX_DEPTH,
            compute_hash: true,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            queue: QueueConfig::default(),
            task_timeout_ms: None,
            tag_ids: Vec::new(),
            db_path: None,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl ImportConfig {
    /// Create a new config for the given root folder
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    /// Create a config builder
    pub fn builder() -> ImportConfigBuilder {
        ImportConfigBuilder::new()
    }

    /// Load a config from a JSON file; missing keys take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, ImportError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ImportError::from(e).with_path(path.to_path_buf()))?;
        let config: ImportConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the options that have hard constraints
    pub fn validate(&self) -> Result<(), ImportError> {
        self.queue.validate()?;
        if self.task_timeout_ms == Some(0) {
            return Err(ImportError::invalid_config("task timeout must be positive"));
        }
        Ok(())
    }

    /// Get the default video extensions
    pub fn default_video_extensions() -> HashSet<String> {
        [
            "mp4", "mkv", "avi", "wmv", "flv", "mov", "webm", "m4v", "ts", "rmvb",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Get the default image extensions
    pub fn default_image_extensions() -> HashSet<String> {
        ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Get the default audio extensions
    pub fn default_audio_extensions() -> HashSet<String> {
        ["mp3", "flac", "wav", "aac", "ogg", "wma", "m4a"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Get all default media extensions
    pub fn default_extensions() -> HashSet<String> {
        let mut extensions = Self::default_video_extensions();
        extensions.extend(Self::default_image_extensions());
        extensions.extend(Self::default_audio_extensions());
        extensions
    }

    /// Get the default directories to ignore
    pub fn default_ignore_dirs() -> HashSet<String> {
        [
            "$RECYCLE.BIN",
            "System Volume Information",
            ".Trash",
            ".Trash-1000",
            "@eaDir",
            ".git",
            ".svn",
            "node_modules",
            "__pycache__",
            ".cache",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Check if an extension should be included
    pub fn should_include_extension(&self, ext: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        self.extensions.contains(&ext.to_lowercase())
    }

    /// Check if a directory should be ignored
    pub fn should_ignore_dir(&self, name: &str) -> bool {
        // Hidden directories
        if name.starts_with('.') {
            return true;
        }
        self.ignore_dirs.contains(name)
    }

    /// Get the effective max depth for walkdir
    pub fn effective_max_depth(&self) -> usize {
        if !self.recursive {
            1
        } else {
            self.max_depth
        }
    }

    /// Per-file timeout, if any
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}

/// Builder for ImportConfig
#[derive(Debug, Default)]
pub struct ImportConfigBuilder {
    config: ImportConfig,
}

impl ImportConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config
    pub fn from_config(config: ImportConfig) -> Self {
        Self { config }
    }

    /// Set the root folder
    pub fn root(mut self, root: PathBuf) -> Self {
        self.config.root = root;
        self
    }

    /// Set the extensions whitelist
    pub fn extensions(mut self, extensions: HashSet<String>) -> Self {
        self.config.extensions = extensions;
        self
    }

    /// Set only video extensions
    pub fn video_only(mut self) -> Self {
        self.config.extensions = ImportConfig::default_video_extensions();
        self
    }

    /// Set only image extensions
    pub fn image_only(mut self) -> Self {
        self.config.extensions = ImportConfig::default_image_extensions();
        self
    }

    /// Add a directory to ignore
    pub fn add_ignore_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.ignore_dirs.insert(dir.into());
        self
    }

    /// Enable or disable recursive scanning
    pub fn recursive(mut self, enabled: bool) -> Self {
        self.config.recursive = enabled;
        self
    }

    /// Set the maximum depth for recursive scanning
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Enable or disable hash computation
    pub fn compute_hash(mut self, enabled: bool) -> Self {
        self.config.compute_hash = enabled;
        self
    }

    /// Set the large file threshold
    pub fn large_file_threshold(mut self, threshold: u64) -> Self {
        self.config.large_file_threshold = threshold;
        self
    }

    /// Set the number of concurrently running imports
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.queue.concurrency = concurrency;
        self
    }

    /// Set the delay range between tasks
    pub fn delay_range(mut self, range: DelayRange) -> Self {
        self.config.queue.delay_range = Some(range);
        self
    }

    /// Set the per-file timeout
    pub fn task_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.task_timeout_ms = Some(timeout_ms);
        self
    }

    /// Add a tag applied to every file
    pub fn add_tag(mut self, tag_id: impl Into<String>) -> Self {
        self.config.tag_ids.push(tag_id.into());
        self
    }

    /// Set the database path
    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    /// Set the progress interval
    pub fn progress_interval_ms(mut self, interval: u64) -> Self {
        self.config.progress_interval_ms = interval;
        self
    }

    /// Build the config
    pub fn build(self) -> ImportConfig {
        self.config
    }
}
