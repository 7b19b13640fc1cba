//! Import driver
//!
//! Submits one unit of work per pending record onto a fresh [`TaskQueue`],
//! settles each record as its task finishes and reports progress to an
//! observer. Per-record failures become `ERROR` records; only invariant
//! violations make [`ImportDriver::ingest`] fail.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::batch::{ImportBatch, ImportStats};
use crate::error::ImportError;
use crate::models::{ImportRecord, RecordUpdate};
use crate::queue::{QueueConfig, TaskError, TaskQueue};

/// Per-file import processing supplied by the application
///
/// Receives a snapshot of the pending record and reports the fields to
/// overlay. Expected failures are returned as `Err`, which settles the
/// record `ERROR` with the error's message.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn process(&self, record: ImportRecord) -> Result<RecordUpdate, ImportError>;
}

#[async_trait]
impl<F, Fut> UnitOfWork for F
where
    F: Fn(ImportRecord) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RecordUpdate, ImportError>> + Send + 'static,
{
    async fn process(&self, record: ImportRecord) -> Result<RecordUpdate, ImportError> {
        (self)(record).await
    }
}

/// Receives progress data while a batch is ingested
pub trait ProgressObserver: Send + Sync {
    /// Called once before any work is submitted
    fn on_started(&self, _batch: &ImportBatch, _stats: &ImportStats) {}

    /// Called after every record settles
    fn on_record_settled(&self, _record: &ImportRecord, _stats: &ImportStats) {}

    /// Called once the queue has drained
    fn on_drained(&self, _stats: &ImportStats, _is_complete: bool) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Settle the record at `index` with `update`
///
/// This is the only place a record reaches a terminal status. Settling a
/// record twice is a driver defect and fails with `DoubleSettlement`.
pub fn apply_update(
    batch: &mut ImportBatch,
    index: usize,
    update: RecordUpdate,
) -> Result<&ImportRecord, ImportError> {
    let settled = batch.records[index].settle(update)?;
    batch.records[index] = settled;
    Ok(&batch.records[index])
}

/// Running totals so progress snapshots stay O(1) per settlement
struct Tally {
    started: Instant,
    completed_bytes: u64,
    total_bytes: u64,
    settled: usize,
    total: usize,
}

impl Tally {
    fn new(batch: &ImportBatch, started: Instant) -> Self {
        let counts = batch.counts();
        Self {
            started,
            completed_bytes: batch.completed_bytes(),
            total_bytes: batch.total_bytes(),
            settled: counts.settled(),
            total: counts.total(),
        }
    }

    fn record_settled(&mut self, size: u64) {
        self.completed_bytes += size;
        self.settled += 1;
    }

    fn snapshot(&self) -> ImportStats {
        ImportStats::new(
            self.completed_bytes,
            self.total_bytes,
            self.started.elapsed(),
            self.settled,
            self.total,
        )
    }
}

/// Orchestrates bounded-concurrency ingestion of import batches
///
/// Clones share cancellation: calling [`ImportDriver::cancel`] on any clone
/// cancels every ingest started on this driver that has not finished.
#[derive(Clone)]
pub struct ImportDriver {
    queue_config: QueueConfig,
    unit_of_work: Arc<dyn UnitOfWork>,
    observer: Arc<dyn ProgressObserver>,
    task_timeout: Option<Duration>,
    active: Arc<Mutex<Vec<TaskQueue>>>,
}

impl ImportDriver {
    /// Create a driver with validated queue options
    pub fn new(
        queue_config: QueueConfig,
        unit_of_work: impl UnitOfWork + 'static,
    ) -> Result<Self, ImportError> {
        queue_config.validate()?;
        Ok(Self {
            queue_config,
            unit_of_work: Arc::new(unit_of_work),
            observer: Arc::new(NoopObserver),
            task_timeout: None,
            active: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Set the progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bound every unit of work by a timeout
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Queue options used for each ingest
    pub fn queue_config(&self) -> &QueueConfig {
        &self.queue_config
    }

    /// Process every pending record of `batch`
    ///
    /// Records that are already terminal are left alone, so a partially
    /// imported batch can be passed in again to resume it. Returns the batch
    /// with its records settled; `completed_at` is set only if no record is
    /// left pending.
    ///
    /// The queue is registered with the driver when this is called, before
    /// the returned future is first polled, so a [`ImportDriver::cancel`]
    /// issued in between still applies to this ingest.
    pub fn ingest(
        &self,
        batch: ImportBatch,
    ) -> impl Future<Output = Result<ImportBatch, ImportError>> + Send + 'static {
        let registered = TaskQueue::new(self.queue_config.clone())
            .map(|queue| ActiveQueue::register(&self.active, queue));
        let driver = self.clone();
        async move {
            let active = registered?;
            driver.run_ingest(&active.queue, batch).await
        }
    }

    async fn run_ingest(
        &self,
        queue: &TaskQueue,
        mut batch: ImportBatch,
    ) -> Result<ImportBatch, ImportError> {
        let tally = Tally::new(&batch, Instant::now());
        if batch.started_at.is_none() {
            batch.started_at = Some(Utc::now());
        }

        let pending = batch.pending_indices();
        info!(
            "Ingesting batch {}: {} of {} record(s) pending, concurrency {}",
            batch.id,
            pending.len(),
            batch.records.len(),
            queue.concurrency()
        );
        self.observer.on_started(&batch, &tally.snapshot());

        let mut in_flight = FuturesUnordered::new();
        for index in pending {
            let record = batch.records[index].clone();
            let unit_of_work = Arc::clone(&self.unit_of_work);
            let timeout = self.task_timeout;
            let handle = queue.submit(move || run_unit(unit_of_work, record, timeout));
            in_flight.push(async move { (index, handle.await) });
        }

        let tally = match self.settle_all(&mut batch, &mut in_flight, tally).await {
            Ok(tally) => tally,
            Err(err) => {
                queue.cancel();
                return Err(err);
            }
        };

        queue.drain().await;

        let is_complete = batch.mark_completed_if_settled(Utc::now());
        let counts = batch.counts();
        info!(
            "Batch {} drained: {} complete, {} duplicate, {} deleted, {} error, {} pending",
            batch.id,
            counts.complete,
            counts.duplicate,
            counts.deleted,
            counts.error,
            counts.pending
        );
        self.observer.on_drained(&tally.snapshot(), is_complete);

        Ok(batch)
    }

    async fn settle_all<S>(
        &self,
        batch: &mut ImportBatch,
        in_flight: &mut S,
        mut tally: Tally,
    ) -> Result<Tally, ImportError>
    where
        S: futures::Stream<Item = (usize, Result<RecordUpdate, TaskError<ImportError>>)> + Unpin,
    {
        while let Some((index, outcome)) = in_flight.next().await {
            let update = match outcome {
                Ok(update) => update,
                Err(TaskError::Rejected(err)) => {
                    warn!("Import failed for {:?}: {}", batch.records[index].path, err.message);
                    RecordUpdate::error(err.message)
                }
                Err(TaskError::Panicked(msg)) => {
                    warn!("Unit of work panicked for {:?}: {}", batch.records[index].path, msg);
                    RecordUpdate::error(format!("unit of work panicked: {}", msg))
                }
                Err(TaskError::Cancelled) => {
                    debug!("Left pending after cancel: {:?}", batch.records[index].path);
                    continue;
                }
            };

            let record = apply_update(batch, index, update)?;
            tally.record_settled(record.size);
            debug!("Settled {:?} as {}", record.path, record.status);
            self.observer.on_record_settled(record, &tally.snapshot());
        }
        Ok(tally)
    }

    /// Cancel every ingest running on this driver or its clones
    ///
    /// Records whose task has not started stay `PENDING`; tasks already
    /// running finish normally. Idempotent, and a no-op when nothing runs.
    pub fn cancel(&self) {
        let queues = lock_active(&self.active).clone();
        if queues.is_empty() {
            debug!("Cancel requested with no ingest running");
            return;
        }
        for queue in queues {
            if !queue.is_cancelled() {
                info!("Cancelling ingest ({} task(s) not started)", queue.pending());
            }
            queue.cancel();
        }
    }

    /// Number of ingests currently registered for cancellation
    pub fn active_ingests(&self) -> usize {
        lock_active(&self.active).len()
    }
}

/// Queue of one ingest, registered with its driver until dropped
struct ActiveQueue {
    registry: Arc<Mutex<Vec<TaskQueue>>>,
    queue: TaskQueue,
}

impl ActiveQueue {
    fn register(registry: &Arc<Mutex<Vec<TaskQueue>>>, queue: TaskQueue) -> Self {
        lock_active(registry).push(queue.clone());
        Self {
            registry: Arc::clone(registry),
            queue,
        }
    }
}

impl Drop for ActiveQueue {
    fn drop(&mut self) {
        lock_active(&self.registry).retain(|queue| !queue.same_queue(&self.queue));
    }
}

fn lock_active(registry: &Mutex<Vec<TaskQueue>>) -> MutexGuard<'_, Vec<TaskQueue>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl fmt::Debug for ImportDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportDriver")
            .field("queue_config", &self.queue_config)
            .field("task_timeout", &self.task_timeout)
            .finish_non_exhaustive()
    }
}

async fn run_unit(
    unit_of_work: Arc<dyn UnitOfWork>,
    record: ImportRecord,
    timeout: Option<Duration>,
) -> Result<RecordUpdate, ImportError> {
    let path = record.path.clone();
    let update = match timeout {
        Some(limit) => match tokio::time::timeout(limit, unit_of_work.process(record)).await {
            Ok(result) => result,
            Err(_) => Err(ImportError::timed_out(path.clone(), limit.as_millis() as u64)),
        },
        None => unit_of_work.process(record).await,
    };
    update.map_err(|err| err.with_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportErrorKind;
    use crate::models::ImportStatus;
    use crate::queue::DelayRange;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{oneshot, Notify};

    fn work<F, Fut>(f: F) -> F
    where
        F: Fn(ImportRecord) -> Fut + Send + Sync,
        Fut: Future<Output = Result<RecordUpdate, ImportError>> + Send + 'static,
    {
        f
    }

    fn batch(count: usize) -> ImportBatch {
        let records = (1..=count)
            .map(|i| {
                ImportRecord::new(
                    PathBuf::from(format!("/import/{}.jpg", i)),
                    format!("{}.jpg", i),
                    "jpg".to_string(),
                    100 * i as u64,
                    Utc::now(),
                )
            })
            .collect();
        ImportBatch::new(PathBuf::from("/import"), Vec::new(), records)
    }

    fn statuses(batch: &ImportBatch) -> Vec<ImportStatus> {
        batch.records.iter().map(|r| r.status).collect()
    }

    #[derive(Default)]
    struct RecordingObserver {
        started: AtomicUsize,
        settled: Mutex<Vec<(String, ImportStatus, ImportStats)>>,
        drained: Mutex<Vec<(ImportStats, bool)>>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_started(&self, _batch: &ImportBatch, _stats: &ImportStats) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_record_settled(&self, record: &ImportRecord, stats: &ImportStats) {
            self.settled
                .lock()
                .unwrap()
                .push((record.name.clone(), record.status, stats.clone()));
        }

        fn on_drained(&self, stats: &ImportStats, is_complete: bool) {
            self.drained.lock().unwrap().push((stats.clone(), is_complete));
        }
    }

    #[tokio::test]
    async fn test_mixed_outcomes_scenario() {
        let driver = ImportDriver::new(
            QueueConfig::new(2),
            work(|record: ImportRecord| async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                match record.name.as_str() {
                    "2.jpg" => Ok(RecordUpdate::duplicate()),
                    "4.jpg" => Err(ImportError::rejected("disk full")),
                    _ => Ok(RecordUpdate::complete()),
                }
            }),
        )
        .unwrap();

        let result = driver.ingest(batch(5)).await.unwrap();

        assert_eq!(
            statuses(&result),
            vec![
                ImportStatus::Complete,
                ImportStatus::Duplicate,
                ImportStatus::Complete,
                ImportStatus::Error,
                ImportStatus::Complete,
            ]
        );
        assert_eq!(result.records[3].error_msg.as_deref(), Some("disk full"));
        assert_eq!(result.status(), ImportStatus::Error);
        assert!(result.started_at.is_some());
        assert!(result.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_leaves_unstarted_records_pending() {
        let started = Arc::new(Notify::new());
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(gate_rx)));

        let unit = {
            let started = Arc::clone(&started);
            work(move |_record: ImportRecord| {
                let started = Arc::clone(&started);
                let gate = gate.lock().unwrap().take();
                async move {
                    started.notify_one();
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    Ok(RecordUpdate::complete())
                }
            })
        };
        let driver = ImportDriver::new(QueueConfig::new(1), unit).unwrap();

        let running = tokio::spawn({
            let driver = driver.clone();
            async move { driver.ingest(batch(3)).await }
        });

        started.notified().await;
        driver.cancel();
        driver.cancel();
        gate_tx.send(()).unwrap();

        let result = running.await.unwrap().unwrap();
        assert_eq!(
            statuses(&result),
            vec![
                ImportStatus::Complete,
                ImportStatus::Pending,
                ImportStatus::Pending,
            ]
        );
        assert!(result.completed_at.is_none());
        assert_eq!(result.status(), ImportStatus::Pending);
    }

    #[tokio::test]
    async fn test_reingest_only_submits_pending_records() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let unit = {
            let seen = Arc::clone(&seen);
            work(move |record: ImportRecord| {
                seen.lock().unwrap().push(record.name.clone());
                async move { Ok(RecordUpdate::complete()) }
            })
        };
        let driver = ImportDriver::new(QueueConfig::new(2), unit).unwrap();

        let mut partial = batch(4);
        apply_update(&mut partial, 0, RecordUpdate::duplicate()).unwrap();
        apply_update(&mut partial, 2, RecordUpdate::error("earlier failure")).unwrap();

        let result = driver.ingest(partial).await.unwrap();

        let mut names = seen.lock().unwrap().clone();
        names.sort();
        assert_eq!(names, vec!["2.jpg".to_string(), "4.jpg".to_string()]);
        assert_eq!(
            statuses(&result),
            vec![
                ImportStatus::Duplicate,
                ImportStatus::Complete,
                ImportStatus::Error,
                ImportStatus::Complete,
            ]
        );
        assert!(result.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_resume_after_cancel_completes_batch() {
        let driver = ImportDriver::new(
            QueueConfig::new(1),
            work(|_record: ImportRecord| async move { Ok(RecordUpdate::complete()) }),
        )
        .unwrap();

        let mut cancelled = batch(3);
        apply_update(&mut cancelled, 0, RecordUpdate::complete()).unwrap();
        let started_at = Utc::now() - chrono::Duration::minutes(5);
        cancelled.started_at = Some(started_at);

        let result = driver.ingest(cancelled).await.unwrap();
        assert!(result.records.iter().all(|r| r.status == ImportStatus::Complete));
        assert_eq!(result.status(), ImportStatus::Complete);
        // Resuming keeps the original start time
        assert_eq!(result.started_at, Some(started_at));
    }

    #[tokio::test]
    async fn test_progress_observer_events() {
        let observer = Arc::new(RecordingObserver::default());
        let driver = ImportDriver::new(
            QueueConfig::new(3),
            work(|record: ImportRecord| async move {
                if record.name == "3.jpg" {
                    Err(ImportError::rejected("unreadable"))
                } else {
                    Ok(RecordUpdate::complete())
                }
            }),
        )
        .unwrap()
        .with_observer(observer.clone());

        driver.ingest(batch(4)).await.unwrap();

        assert_eq!(observer.started.load(Ordering::SeqCst), 1);
        let settled = observer.settled.lock().unwrap();
        assert_eq!(settled.len(), 4);
        let last = &settled.last().unwrap().2;
        assert_eq!(last.settled_records, 4);
        assert_eq!(last.completed_bytes, 1000);
        assert_eq!(last.total_bytes, 1000);
        assert!(settled
            .iter()
            .any(|(name, status, _)| name == "3.jpg" && *status == ImportStatus::Error));
        // Snapshots only grow
        for pair in settled.windows(2) {
            assert!(pair[0].2.completed_bytes <= pair[1].2.completed_bytes);
        }

        let drained = observer.drained.lock().unwrap();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].1);
        assert_eq!(drained[0].0.settled_records, 4);
    }

    #[tokio::test]
    async fn test_concurrency_bound_through_driver() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let unit = {
            let (current, peak) = (Arc::clone(&current), Arc::clone(&peak));
            work(move |_record: ImportRecord| {
                let (current, peak) = (Arc::clone(&current), Arc::clone(&peak));
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(3)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(RecordUpdate::complete())
                }
            })
        };
        let driver = ImportDriver::new(QueueConfig::new(2), unit).unwrap();

        let result = driver.ingest(batch(10)).await.unwrap();
        assert_eq!(result.status(), ImportStatus::Complete);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_task_timeout_settles_error() {
        let driver = ImportDriver::new(
            QueueConfig::new(2),
            work(|record: ImportRecord| async move {
                if record.name == "1.jpg" {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(RecordUpdate::complete())
            }),
        )
        .unwrap()
        .with_task_timeout(Duration::from_millis(20));

        let result = driver.ingest(batch(2)).await.unwrap();
        assert_eq!(result.records[0].status, ImportStatus::Error);
        assert!(result.records[0]
            .error_msg
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert_eq!(result.records[1].status, ImportStatus::Complete);
    }

    #[tokio::test]
    async fn test_panicking_unit_settles_error() {
        let driver = ImportDriver::new(
            QueueConfig::new(1),
            work(|record: ImportRecord| async move {
                if record.name == "1.jpg" {
                    panic!("decoder exploded");
                }
                Ok(RecordUpdate::complete())
            }),
        )
        .unwrap();

        let result = driver.ingest(batch(2)).await.unwrap();
        assert_eq!(result.records[0].status, ImportStatus::Error);
        assert!(result.records[0]
            .error_msg
            .as_deref()
            .unwrap()
            .contains("decoder exploded"));
        assert_eq!(result.records[1].status, ImportStatus::Complete);
    }

    #[tokio::test]
    async fn test_empty_batch_completes() {
        let observer = Arc::new(RecordingObserver::default());
        let driver = ImportDriver::new(
            QueueConfig::default(),
            work(|_record: ImportRecord| async move { Ok(RecordUpdate::complete()) }),
        )
        .unwrap()
        .with_observer(observer.clone());

        let result = driver.ingest(batch(0)).await.unwrap();
        assert!(result.completed_at.is_some());
        assert_eq!(result.status(), ImportStatus::Complete);
        assert_eq!(observer.drained.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_apply_update_twice_is_double_settlement() {
        let mut b = batch(1);
        apply_update(&mut b, 0, RecordUpdate::complete()).unwrap();
        let err = apply_update(&mut b, 0, RecordUpdate::error("again")).unwrap_err();
        assert_eq!(err.kind, ImportErrorKind::DoubleSettlement);
        assert_eq!(b.records[0].status, ImportStatus::Complete);
    }

    #[test]
    fn test_invalid_queue_config_is_rejected() {
        let result = ImportDriver::new(
            QueueConfig::new(0),
            work(|_record: ImportRecord| async move { Ok(RecordUpdate::complete()) }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cancel_without_ingest_is_noop() {
        let driver = ImportDriver::new(
            QueueConfig::default(),
            work(|_record: ImportRecord| async move { Ok(RecordUpdate::complete()) }),
        )
        .unwrap();
        driver.cancel();
    }

    #[tokio::test]
    async fn test_cancel_before_first_poll_leaves_every_record_pending() {
        let calls = Arc::new(AtomicUsize::new(0));
        let unit = {
            let calls = Arc::clone(&calls);
            work(move |_record: ImportRecord| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(RecordUpdate::complete()) }
            })
        };
        let driver = ImportDriver::new(QueueConfig::new(1), unit).unwrap();

        let ingest = driver.ingest(batch(3));
        assert_eq!(driver.active_ingests(), 1);
        driver.cancel();
        let result = ingest.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(result.records.iter().all(|r| r.status == ImportStatus::Pending));
        assert!(result.completed_at.is_none());
        assert_eq!(driver.active_ingests(), 0);
    }

    #[tokio::test]
    async fn test_cancel_reaches_ingest_outliving_another() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let unit = {
            let (started, release) = (Arc::clone(&started), Arc::clone(&release));
            work(move |record: ImportRecord| {
                let (started, release) = (Arc::clone(&started), Arc::clone(&release));
                async move {
                    if record.path.starts_with("/slow") {
                        started.notify_one();
                        release.notified().await;
                    }
                    Ok(RecordUpdate::complete())
                }
            })
        };
        let driver = ImportDriver::new(QueueConfig::new(1), unit).unwrap();

        let mut slow_batch = batch(3);
        slow_batch.root_folder_path = PathBuf::from("/slow");
        for record in &mut slow_batch.records {
            record.path = PathBuf::from("/slow").join(&record.name);
        }

        let slow = tokio::spawn(driver.clone().ingest(slow_batch));
        started.notified().await;

        let fast = driver.ingest(batch(2)).await.unwrap();
        assert_eq!(fast.status(), ImportStatus::Complete);
        assert_eq!(driver.active_ingests(), 1);

        driver.cancel();
        release.notify_one();

        let slow = slow.await.unwrap().unwrap();
        assert_eq!(
            statuses(&slow),
            vec![
                ImportStatus::Complete,
                ImportStatus::Pending,
                ImportStatus::Pending,
            ]
        );
        assert_eq!(driver.active_ingests(), 0);
    }

    #[tokio::test]
    async fn test_delay_range_spaces_out_starts() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let unit = {
            let starts = Arc::clone(&starts);
            work(move |_record: ImportRecord| {
                starts.lock().unwrap().push(Instant::now());
                async move { Ok(RecordUpdate::complete()) }
            })
        };
        let config = QueueConfig::new(1).with_delay(DelayRange::new(15, 25).unwrap());
        let driver = ImportDriver::new(config, unit).unwrap();

        let result = driver.ingest(batch(3)).await.unwrap();
        assert_eq!(result.status(), ImportStatus::Complete);

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(15));
        }
    }
}
