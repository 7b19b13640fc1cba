//! Sequential chain of dependent operations
//!
//! A [`TaskQueue`] pinned to one task at a time with no delay. Task N+1
//! starts only after task N has settled, whatever its outcome; a rejection
//! does not stop the chain, only [`SequentialChain::cancel`] does.

use std::future::Future;

use crate::queue::{TaskHandle, TaskQueue};

/// Runs operations strictly one after another in submission order
#[derive(Debug, Clone)]
pub struct SequentialChain {
    queue: TaskQueue,
}

impl Default for SequentialChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            queue: TaskQueue::from_parts(1, None),
        }
    }

    /// Append an operation to the end of the chain
    pub fn push<F, Fut, T, E>(&self, work: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.queue.submit(work)
    }

    /// Drop every operation that has not started yet
    pub fn cancel(&self) {
        self.queue.cancel();
    }

    /// Wait for the chain to run dry
    pub async fn drain(&self) {
        self.queue.drain().await;
    }

    /// Operations waiting behind the current one
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Whether the chain has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.queue.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskError;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_operations_observe_each_other_in_order() {
        let chain = SequentialChain::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        // Earlier operations sleep longer; order must still hold
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let log = Arc::clone(&log);
                chain.push(move || async move {
                    log.lock().unwrap().push(format!("start {}", i));
                    tokio::time::sleep(Duration::from_millis(8 - 2 * i)).await;
                    log.lock().unwrap().push(format!("end {}", i));
                    Ok::<_, String>(i)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i as u64);
        }

        let expected: Vec<String> = (0..4)
            .flat_map(|i| vec![format!("start {}", i), format!("end {}", i)])
            .collect();
        assert_eq!(*log.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_rejection_does_not_stop_chain() {
        let chain = SequentialChain::new();
        let first = chain.push(|| async { Err::<u32, _>("tag not found".to_string()) });
        let second = chain.push(|| async { Ok::<u32, String>(2) });

        assert!(matches!(first.await, Err(TaskError::Rejected(_))));
        assert_eq!(second.await.unwrap(), 2);
        chain.drain().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_remaining_operations() {
        let chain = SequentialChain::new();
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let head = chain.push(move || async move {
            let _ = gate_rx.await;
            Ok::<_, String>("head")
        });
        let tail = chain.push(|| async { Ok::<_, String>("tail") });
        assert_eq!(chain.pending(), 1);

        chain.cancel();
        assert!(chain.is_cancelled());
        gate_tx.send(()).unwrap();

        assert_eq!(head.await.unwrap(), "head");
        assert!(tail.await.unwrap_err().is_cancelled());
        chain.drain().await;
    }
}
