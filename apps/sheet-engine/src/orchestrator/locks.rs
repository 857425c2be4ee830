use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Per-design async mutexes: runs for one design id never interleave,
/// runs for different designs proceed independently. An entry lives only
/// while a guard or a waiter refers to it.
#[derive(Debug, Default, Clone)]
pub struct DesignLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Proof that the holder owns the run slot for `design_id`.
#[derive(Debug)]
pub struct DesignGuard {
    design_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl DesignGuard {
    pub fn design_id(&self) -> &str {
        &self.design_id
    }
}

impl Drop for DesignGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Holds the shard lock, so no acquirer can clone the mutex concurrently.
        let removed = self
            .locks
            .remove_if(&self.design_id, |_, lock| Arc::strong_count(lock) == 1)
            .is_some();
        debug!(design_id = %self.design_id, removed, "design lock released");
    }
}

impl DesignLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, design_id: &str) -> DesignGuard {
        let lock = self
            .locks
            .entry(design_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        debug!(design_id, "design lock acquired");
        DesignGuard {
            design_id: design_id.to_string(),
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }
}
