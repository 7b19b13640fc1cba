//! Bounded-concurrency task queue
//!
//! Units of work are admitted in submission order and at most `concurrency`
//! of them run at once. Every task's outcome is isolated: a rejection or a
//! panic in one task never stops the queue or its siblings.
//!
//! Admitted tasks are spawned onto the ambient tokio runtime, so `submit`
//! must be called from within a runtime context.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::error::ImportError;

/// Default number of concurrently running tasks
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Random pause applied between a task settling and the next one starting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    /// Lower bound in milliseconds (inclusive)
    pub min_ms: u64,
    /// Upper bound in milliseconds (inclusive)
    pub max_ms: u64,
}

impl DelayRange {
    /// Create a validated delay range
    pub fn new(min_ms: u64, max_ms: u64) -> Result<Self, ImportError> {
        let range = Self { min_ms, max_ms };
        range.validate()?;
        Ok(range)
    }

    /// A range that always yields the same pause
    pub fn fixed(ms: u64) -> Self {
        Self {
            min_ms: ms,
            max_ms: ms,
        }
    }

    /// Check that the bounds are ordered
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.min_ms > self.max_ms {
            return Err(ImportError::invalid_config(format!(
                "delay range min ({}ms) exceeds max ({}ms)",
                self.min_ms, self.max_ms
            )));
        }
        Ok(())
    }

    /// Draw a uniformly distributed pause from the range
    pub fn sample(&self) -> Duration {
        let ms = if self.min_ms >= self.max_ms {
            self.min_ms
        } else {
            rand::thread_rng().gen_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(ms)
    }
}

/// Recognized queue options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of tasks running at once (at least 1)
    pub concurrency: usize,
    /// Optional pause between a settlement and the next start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_range: Option<DelayRange>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            delay_range: None,
        }
    }
}

impl QueueConfig {
    /// Create a config with the given concurrency and no delay
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            delay_range: None,
        }
    }

    /// Set the delay range
    pub fn with_delay(mut self, range: DelayRange) -> Self {
        self.delay_range = Some(range);
        self
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.concurrency == 0 {
            return Err(ImportError::invalid_config("concurrency must be at least 1"));
        }
        if let Some(range) = &self.delay_range {
            range.validate()?;
        }
        Ok(())
    }
}

/// Why a submitted task did not produce a value
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The queue was cancelled before the task started
    #[error("task cancelled before it started")]
    Cancelled,
    /// The unit of work rejected with its own error
    #[error("task rejected: {0}")]
    Rejected(E),
    /// The unit of work panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl<E> TaskError<E> {
    /// Whether the task never ran
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

/// Pending result of a submitted task
///
/// Resolves when the unit of work settles, or with [`TaskError::Cancelled`]
/// if the queue drops the task before starting it.
#[derive(Debug)]
pub struct TaskHandle<T, E> {
    rx: oneshot::Receiver<Result<T, TaskError<E>>>,
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Cancelled)))
    }
}

type Job = BoxFuture<'static, ()>;

#[derive(Default)]
struct QueueState {
    /// Admitted-later tasks, head starts first
    pending: VecDeque<Job>,
    /// Tasks spawned and not yet settled
    running: usize,
    /// Slots held back while a post-settlement delay elapses
    cooling: usize,
    cancelled: bool,
    drain_waiters: Vec<oneshot::Sender<()>>,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.running == 0 && self.pending.is_empty()
    }

    fn has_capacity(&self, concurrency: usize) -> bool {
        self.running + self.cooling < concurrency
    }

    fn take_waiters_if_idle(&mut self) -> Vec<oneshot::Sender<()>> {
        if self.is_idle() {
            std::mem::take(&mut self.drain_waiters)
        } else {
            Vec::new()
        }
    }
}

struct QueueInner {
    concurrency: usize,
    delay_range: Option<DelayRange>,
    state: Mutex<QueueState>,
}

impl QueueInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        // Counters stay consistent even if a holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(self: &Arc<Self>, job: Job) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            job.await;
            inner.on_settled().await;
        });
    }

    async fn on_settled(self: Arc<Self>) {
        let cooldown = {
            let mut state = self.state();
            state.running -= 1;
            match self.delay_range {
                Some(range) if !state.cancelled && !state.pending.is_empty() => {
                    state.cooling += 1;
                    Some(range.sample())
                }
                _ => None,
            }
        };

        if let Some(pause) = cooldown {
            trace!("Queue cooling down for {}ms", pause.as_millis());
            tokio::time::sleep(pause).await;
            self.state().cooling -= 1;
        }

        self.pump();
    }

    /// Start as many pending tasks as capacity allows, then release drain
    /// waiters if the queue went idle.
    fn pump(self: &Arc<Self>) {
        let (ready, waiters) = {
            let mut state = self.state();
            let mut ready = Vec::new();
            if !state.cancelled {
                while state.has_capacity(self.concurrency) {
                    match state.pending.pop_front() {
                        Some(job) => {
                            state.running += 1;
                            ready.push(job);
                        }
                        None => break,
                    }
                }
            }
            (ready, state.take_waiters_if_idle())
        };

        for job in ready {
            self.spawn(job);
        }
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

/// FIFO executor running at most `concurrency` units of work at once
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    /// Create a queue from validated options
    pub fn new(config: QueueConfig) -> Result<Self, ImportError> {
        config.validate()?;
        Ok(Self::from_parts(config.concurrency, config.delay_range))
    }

    pub(crate) fn from_parts(concurrency: usize, delay_range: Option<DelayRange>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                concurrency: concurrency.max(1),
                delay_range,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Enqueue a unit of work
    ///
    /// Never blocks: the task starts right away when a slot is free and no
    /// earlier task is waiting, otherwise it joins the back of the line.
    pub fn submit<F, Fut, T, E>(&self, work: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = async move {
            let outcome = match AssertUnwindSafe(async move { work().await })
                .catch_unwind()
                .await
            {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(TaskError::Rejected(err)),
                Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
            };
            let _ = tx.send(outcome);
        }
        .boxed();

        let start_now = {
            let mut state = self.inner.state();
            if state.cancelled {
                trace!("Rejecting submission to cancelled queue");
                // Dropping the job drops its sender: the handle sees Cancelled
                None
            } else if state.pending.is_empty() && state.has_capacity(self.inner.concurrency) {
                state.running += 1;
                Some(job)
            } else {
                state.pending.push_back(job);
                None
            }
        };

        if let Some(job) = start_now {
            self.inner.spawn(job);
        }

        TaskHandle { rx }
    }

    /// Stop admitting tasks
    ///
    /// Tasks that have not started resolve with [`TaskError::Cancelled`]
    /// without running. Running tasks finish on their own and deliver their
    /// own result. Idempotent.
    pub fn cancel(&self) {
        let (dropped, waiters) = {
            let mut state = self.inner.state();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            let dropped: Vec<Job> = state.pending.drain(..).collect();
            (dropped, state.take_waiters_if_idle())
        };

        debug!(
            "Queue cancelled: {} pending task(s) dropped",
            dropped.len()
        );
        drop(dropped);

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Wait until no task is running and none is pending
    ///
    /// Returns immediately on an idle queue. Any number of callers may wait
    /// at the same time.
    pub async fn drain(&self) {
        let waiter = {
            let mut state = self.inner.state();
            if state.is_idle() {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.drain_waiters.push(tx);
            rx
        };
        let _ = waiter.await;
    }

    /// Configured concurrency limit
    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// Number of tasks currently running
    pub fn running(&self) -> usize {
        self.inner.state().running
    }

    /// Number of tasks waiting to start
    pub fn pending(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// Whether [`TaskQueue::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        self.inner.state().cancelled
    }

    /// Whether both handles refer to the same queue
    pub fn same_queue(&self, other: &TaskQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("TaskQueue")
            .field("concurrency", &self.inner.concurrency)
            .field("delay_range", &self.inner.delay_range)
            .field("running", &state.running)
            .field("pending", &state.pending.len())
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
