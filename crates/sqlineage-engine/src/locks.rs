//! Per-run reader/writer locks
//!
//! Realtime upserts of a run share its lock; a full rebuild holds it
//! exclusively, so a rebuild never interleaves with an upsert of the same run.

use sqlineage_core::RunId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Registry of one `RwLock` per run
#[derive(Debug, Clone, Default)]
pub struct RunLocks {
    locks: Arc<Mutex<HashMap<RunId, Arc<RwLock<()>>>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, run_id: &RunId) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(run_id.clone()).or_default())
    }

    /// Shared access for an incremental update
    pub async fn shared(&self, run_id: &RunId) -> OwnedRwLockReadGuard<()> {
        self.lock_for(run_id).await.read_owned().await
    }

    /// Exclusive access for a rebuild
    pub async fn exclusive(&self, run_id: &RunId) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(run_id).await.write_owned().await
    }

    /// Drop the lock of a run nobody holds or waits on.
    ///
    /// Returns `false` and keeps the entry while a guard or a pending
    /// acquisition still references it; a later call creates a fresh lock.
    pub async fn forget(&self, run_id: &RunId) -> bool {
        let mut locks = self.locks.lock().await;
        match locks.get(run_id) {
            Some(lock) if Arc::strong_count(lock) == 1 => {
                locks.remove(run_id);
                true
            }
            _ => false,
        }
    }

    /// Number of runs with a lock entry
    pub async fn tracked_runs(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shared_guards_coexist() {
        let locks = RunLocks::new();
        let run = RunId::new("run-1");
        let _a = locks.shared(&run).await;
        let _b = locks.shared(&run).await;
    }

    #[tokio::test]
    async fn exclusive_waits_for_shared() {
        let locks = RunLocks::new();
        let run = RunId::new("run-1");
        let shared = locks.shared(&run).await;

        let pending = tokio::time::timeout(Duration::from_millis(20), locks.exclusive(&run)).await;
        assert!(pending.is_err());

        drop(shared);
        let exclusive =
            tokio::time::timeout(Duration::from_millis(200), locks.exclusive(&run)).await;
        assert!(exclusive.is_ok());
    }

    #[tokio::test]
    async fn forget_keeps_held_locks() {
        let locks = RunLocks::new();
        let run = RunId::new("run-1");

        let guard = locks.shared(&run).await;
        assert!(!locks.forget(&run).await);
        assert_eq!(locks.tracked_runs().await, 1);

        drop(guard);
        assert!(locks.forget(&run).await);
        assert_eq!(locks.tracked_runs().await, 0);
        assert!(!locks.forget(&run).await);

        // A forgotten run can be locked again
        let _again = locks.exclusive(&run).await;
        assert_eq!(locks.tracked_runs().await, 1);
    }

    #[tokio::test]
    async fn runs_do_not_block_each_other() {
        let locks = RunLocks::new();
        let _a = locks.exclusive(&RunId::new("run-1")).await;
        let other = RunId::new("run-2");
        let b = tokio::time::timeout(Duration::from_millis(200), locks.exclusive(&other)).await;
        assert!(b.is_ok());
    }
}
