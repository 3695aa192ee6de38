//! Bounded pool for CPU-bound ingest work.
//!
//! Script conversion and jacket rendering run on tokio's blocking threads,
//! gated by a semaphore so a burst of uploads cannot occupy every blocking
//! thread at once.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker pool is closed")]
    Closed,

    #[error("{task} task failed: {message}")]
    Panicked { task: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(max_blocking: usize) -> Self {
        let size = max_blocking.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `work` on a blocking thread once a permit is free.
    pub async fn run<F, T>(&self, task: &'static str, work: F) -> Result<T, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| WorkerError::Closed)?;

        let span = tracing::debug_span!("blocking", task);
        let parent = tracing::Span::current();
        tokio::task::spawn_blocking(move || parent.in_scope(work))
            .instrument(span)
            .await
            .map_err(|e| WorkerError::Panicked {
                task,
                message: e.to_string(),
            })
    }

    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_work() {
        let pool = WorkerPool::new(2);
        let out = pool.run("sum", || (1..=10).sum::<u32>()).await.unwrap();
        assert_eq!(out, 55);
    }

    #[tokio::test]
    async fn test_zero_size_is_clamped() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..8).map(|_| {
            let pool = pool.clone();
            let active = active.clone();
            let peak = peak.clone();
            async move {
                pool.run("sleep", move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap()
            }
        });
        futures::future::join_all(jobs).await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let pool = WorkerPool::new(1);
        let err = pool
            .run("boom", || -> u32 { panic!("boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Panicked { task: "boom", .. }));
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_work() {
        let pool = WorkerPool::new(1);
        pool.close();
        assert!(matches!(pool.run("noop", || ()).await, Err(WorkerError::Closed)));
    }
}
