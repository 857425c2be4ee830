use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::debug;

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run cancelled")]
pub struct Cancelled;

/// Runs jobs in fixed-size batches; a batch starts only after the previous one finished.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Outputs are returned in job order. Jobs are lazy futures, so the ones
    /// in batches after a cancellation never run.
    pub async fn run<F, T>(&self, jobs: Vec<F>, cancel: &CancelToken) -> Result<Vec<T>, Cancelled>
    where
        F: Future<Output = T>,
    {
        let total = jobs.len();
        let mut out = Vec::with_capacity(total);
        let mut jobs = jobs.into_iter();
        loop {
            let batch: Vec<F> = jobs.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                return Ok(out);
            }
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            debug!(done = out.len(), batch = batch.len(), total, "starting batch");
            out.extend(join_all(batch).await);
        }
    }
}
