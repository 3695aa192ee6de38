//! Per-chart edit serialization within one process.
//!
//! Two edits of the same chart would otherwise read the same asset set, and
//! the later commit could point at a blob the earlier one just deleted. The
//! revision check in the metadata store catches that across processes; this
//! lock keeps it from happening at all within one.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ids::ChartId;

#[derive(Debug, Clone, Default)]
pub struct ChartLocks {
    locks: Arc<DashMap<ChartId, Arc<Mutex<()>>>>,
}

/// Held for the duration of one edit.
pub struct ChartGuard {
    locks: ChartLocks,
    id: ChartId,
    _guard: OwnedMutexGuard<()>,
}

impl ChartLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: &ChartId) -> ChartGuard {
        let mutex = self.locks.entry(id.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        ChartGuard {
            locks: self.clone(),
            id: id.clone(),
            _guard: guard,
        }
    }

    /// Charts with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for ChartGuard {
    fn drop(&mut self) {
        // The map and this guard hold the only references: nobody is waiting.
        self.locks
            .locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) <= 2);
    }
}
