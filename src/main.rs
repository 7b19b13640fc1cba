//! Media Ingest CLI
//!
//! Imports a folder of media files into a library with bounded concurrency.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use media_ingest::{
    scan_folder, DelayRange, ImportBatch, ImportConfig, ImportConfigBuilder, ImportDriver,
    ImportError, ImportErrorKind, LibraryDatabase, LibraryImporter, ProgressReporter,
};

const ABOUT: &str = r#"
Media Ingest - bounded-concurrency media importer

Examples:
  media_ingest import -r /path/to/media                Import a folder
  media_ingest import -r /photos -c 4 -t holiday       4 files at once, tagged
  media_ingest import -r /nas --delay-min 50 --delay-max 200
                                                       Pause between files
  media_ingest import -r /media --progress             JSON progress on stderr
  media_ingest resume --batch <id>                     Continue a cancelled batch
  media_ingest resume --batch <id> --retry-failed      Retry failed records too
  media_ingest resume --batch <id> --config import.json
                                                       Resume with the import's options
  media_ingest status --batch <id> --json              Show a stored batch
  media_ingest batches                                 List stored batches
"#;

const DEFAULT_DB: &str = "media_ingest.db";

/// Bounded-concurrency media importer
#[derive(Parser)]
#[command(name = "media_ingest")]
#[command(author, version, about = ABOUT, long_about = None)]
#[command(help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every command that runs an ingest
#[derive(Args, Debug)]
struct RunArgs {
    /// Number of files imported at once
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Minimum pause between files in milliseconds
    #[arg(long)]
    delay_min: Option<u64>,

    /// Maximum pause between files in milliseconds
    #[arg(long)]
    delay_max: Option<u64>,

    /// Give up on a file after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// SQLite library database
    #[arg(short = 'd', long)]
    db: Option<PathBuf>,

    /// Skip hashing (disables duplicate detection)
    #[arg(long)]
    no_hash: bool,

    /// Write JSON progress lines to stderr
    #[arg(long)]
    progress: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a folder and import its media files
    Import {
        /// Folder to import
        #[arg(short = 'r', long)]
        root: Option<PathBuf>,

        /// Tag applied to every imported file (repeatable)
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,

        /// JSON config file; command line flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only import files in the root folder
        #[arg(long)]
        no_recursive: bool,

        /// Maximum folder depth
        #[arg(long)]
        max_depth: Option<usize>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Continue a stored batch from its pending records
    Resume {
        /// Batch id
        #[arg(long)]
        batch: String,

        /// Reset failed records to pending before resuming
        #[arg(long)]
        retry_failed: bool,

        /// JSON config file; command line flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show a stored batch
    Status {
        /// Batch id
        #[arg(long)]
        batch: String,

        /// SQLite library database
        #[arg(short = 'd', long)]
        db: Option<PathBuf>,

        /// Print the full batch as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored batches
    Batches {
        /// SQLite library database
        #[arg(short = 'd', long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Import {
            root,
            tags,
            config,
            no_recursive,
            max_depth,
            run,
        }) => run_import(root, tags, config, no_recursive, max_depth, run).await,
        Some(Commands::Resume {
            batch,
            retry_failed,
            config,
            run,
        }) => run_resume(&batch, retry_failed, config, run).await,
        Some(Commands::Status { batch, db, json }) => show_status(&batch, db, json),
        Some(Commands::Batches { db }) => list_batches(db),
        None => {
            println!("{}", ABOUT);
            println!("Use 'media_ingest --help' for the full option list");
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}

async fn run_import(
    root: Option<PathBuf>,
    tags: Vec<String>,
    config_path: Option<PathBuf>,
    no_recursive: bool,
    max_depth: Option<usize>,
    run: RunArgs,
) -> Result<(), ImportError> {
    let mut builder = load_config(config_path.as_deref(), &run)?;
    if let Some(root) = root {
        builder = builder.root(root);
    }
    for tag in tags {
        builder = builder.add_tag(tag);
    }
    if no_recursive {
        builder = builder.recursive(false);
    }
    if let Some(depth) = max_depth {
        builder = builder.max_depth(depth);
    }
    let config = builder.build();

    if config.root.as_os_str().is_empty() {
        return Err(ImportError::invalid_config(
            "no root folder given (use -r or set \"root\" in the config file)",
        ));
    }
    config.validate()?;

    info!("Scanning {:?}", config.root);
    let reporter = Arc::new(ProgressReporter::new(run.progress, config.progress_interval_ms));
    let outcome = scan_folder(&config)?;
    for err in &outcome.errors {
        warn!("Skipped during scan: {}", err);
        reporter.report_error(err);
    }
    if outcome.error_count() > 0 {
        warn!("{} path(s) could not be read during the scan", outcome.error_count());
    }

    let batch = run_ingest(&config, outcome.batch, reporter).await?;
    print_summary(&batch, run.json)
}

async fn run_resume(
    batch_id: &str,
    retry_failed: bool,
    config_path: Option<PathBuf>,
    run: RunArgs,
) -> Result<(), ImportError> {
    let config = load_config(config_path.as_deref(), &run)?.build();
    config.validate()?;

    let mut batch = {
        let db = open_database(config.db_path.as_deref())?;
        db.load_batch(batch_id)?
            .ok_or_else(|| batch_not_found(batch_id))?
    };

    if retry_failed {
        let reset = batch.reset_failed();
        info!("Reset {} failed record(s) to pending", reset);
    }

    let config = ImportConfigBuilder::from_config(config)
        .root(batch.root_folder_path.clone())
        .build();
    let reporter = Arc::new(ProgressReporter::new(run.progress, config.progress_interval_ms));
    let batch = run_ingest(&config, batch, reporter).await?;
    print_summary(&batch, run.json)
}

/// Ingest `batch`, saving it before and after so it can always be resumed
async fn run_ingest(
    config: &ImportConfig,
    batch: ImportBatch,
    reporter: Arc<ProgressReporter>,
) -> Result<ImportBatch, ImportError> {
    let db = Arc::new(Mutex::new(open_database(config.db_path.as_deref())?));
    save(&db, &batch)?;

    let importer = LibraryImporter::new(Arc::clone(&db), config).with_tag_ids(batch.tag_ids.clone());
    let mut driver = ImportDriver::new(config.queue.clone(), importer)?.with_observer(reporter);
    if let Some(timeout) = config.task_timeout() {
        driver = driver.with_task_timeout(timeout);
    }

    let interrupt = {
        let driver = driver.clone();
        tokio::spawn(async move {
            let mut interrupted = false;
            while tokio::signal::ctrl_c().await.is_ok() {
                if on_interrupt(&mut interrupted, &driver) {
                    warn!("Interrupted again, exiting without waiting");
                    std::process::exit(130);
                }
            }
        })
    };

    let batch = driver.ingest(batch).await;
    interrupt.abort();
    let batch = batch?;

    save(&db, &batch)?;
    if batch.has_pending() {
        info!(
            "Batch {} saved with pending records; continue with: media_ingest resume --batch {}",
            batch.id, batch.id
        );
    }
    Ok(batch)
}

/// Cancel on the first interrupt; returns true once the process should exit
fn on_interrupt(interrupted: &mut bool, driver: &ImportDriver) -> bool {
    if *interrupted {
        return true;
    }
    *interrupted = true;
    warn!("Interrupted, letting running files finish (Ctrl-C again to exit)");
    driver.cancel();
    false
}

/// Start from the config file, if any, with the command line flags on top
fn load_config(
    config_path: Option<&Path>,
    run: &RunArgs,
) -> Result<ImportConfigBuilder, ImportError> {
    let base = match config_path {
        Some(path) => ImportConfig::from_json_file(path)?,
        None => ImportConfig::default(),
    };
    apply_run_args(ImportConfigBuilder::from_config(base), run)
}

fn apply_run_args(
    mut builder: ImportConfigBuilder,
    run: &RunArgs,
) -> Result<ImportConfigBuilder, ImportError> {
    if let Some(concurrency) = run.concurrency {
        builder = builder.concurrency(concurrency);
    }
    match (run.delay_min, run.delay_max) {
        (None, None) => {}
        (min, max) => {
            let min = min.unwrap_or(0);
            builder = builder.delay_range(DelayRange::new(min, max.unwrap_or(min))?);
        }
    }
    if let Some(timeout_ms) = run.timeout_ms {
        builder = builder.task_timeout_ms(timeout_ms);
    }
    if run.no_hash {
        builder = builder.compute_hash(false);
    }
    if let Some(db) = &run.db {
        builder = builder.db_path(db.clone());
    }
    Ok(builder)
}

fn open_database(path: Option<&Path>) -> Result<LibraryDatabase, ImportError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_DB));
    LibraryDatabase::open(path)
}

fn batch_not_found(batch_id: &str) -> ImportError {
    ImportError::new(
        ImportErrorKind::NotFound,
        None,
        format!("no batch with id {}", batch_id),
    )
}

fn save(db: &Mutex<LibraryDatabase>, batch: &ImportBatch) -> Result<(), ImportError> {
    db.lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .save_batch(batch)
}

fn print_summary(batch: &ImportBatch, json: bool) -> Result<(), ImportError> {
    let counts = batch.counts();
    if json {
        let summary = serde_json::json!({
            "id": batch.id,
            "root": batch.root_folder_path,
            "status": batch.status(),
            "counts": counts,
            "started_at": batch.started_at,
            "completed_at": batch.completed_at,
            "total_bytes": batch.total_bytes(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Import {}:", batch.id);
        println!("  Status: {}", batch.status());
        println!("  Complete: {}", counts.complete);
        println!("  Duplicate: {}", counts.duplicate);
        println!("  Deleted: {}", counts.deleted);
        println!("  Errors: {}", counts.error);
        println!("  Pending: {}", counts.pending);
        if let (Some(start), Some(end)) = (batch.started_at, batch.completed_at) {
            println!("  Duration: {}ms", (end - start).num_milliseconds().max(0));
        }
    }
    Ok(())
}

fn show_status(batch_id: &str, db: Option<PathBuf>, json: bool) -> Result<(), ImportError> {
    let db = open_database(db.as_deref())?;
    let batch = db
        .load_batch(batch_id)?
        .ok_or_else(|| batch_not_found(batch_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
        return Ok(());
    }
    print_summary(&batch, false)?;
    for record in batch.records.iter().filter(|r| r.error_msg.is_some()) {
        println!(
            "  ! {}: {}",
            record.path.display(),
            record.error_msg.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

fn list_batches(db: Option<PathBuf>) -> Result<(), ImportError> {
    let db = open_database(db.as_deref())?;
    for summary in db.list_batches()? {
        let state = if summary.completed_at.is_some() {
            "done"
        } else {
            "open"
        };
        println!(
            "{}  {:<5} {:>6} record(s)  {}",
            summary.id, state, summary.record_count, summary.root_folder_path
        );
    }
    Ok(())
}
