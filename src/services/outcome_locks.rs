//! Per-outcome mutual exclusion.
//!
//! Every mutation of an outcome's context store, dependency edges and
//! escalations runs while holding that outcome's lock. Different outcomes
//! proceed in parallel. Entries nobody holds or waits on are evicted the
//! next time any lock is requested.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
pub struct OutcomeLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl OutcomeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, outcome_id: Uuid) -> Arc<AsyncMutex<()>> {
        // The registry lock is never held across an await.
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Only the map itself references an idle entry.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(outcome_id).or_default().clone()
    }

    /// Wait for exclusive access to `outcome_id`.
    pub async fn lock(&self, outcome_id: Uuid) -> OwnedMutexGuard<()> {
        self.entry(outcome_id).lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map_or(0, |locks| locks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_outcome_is_serialized() {
        let locks = OutcomeLocks::new();
        let outcome = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(outcome).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_idle_entries_are_evicted() {
        let locks = OutcomeLocks::new();
        let held = Uuid::new_v4();
        let guard = locks.lock(held).await;
        for _ in 0..5 {
            drop(locks.lock(Uuid::new_v4()).await);
        }
        assert_eq!(locks.len(), 2, "the held entry and the latest idle one");

        drop(guard);
        drop(locks.lock(held).await);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_waiters_keep_their_entry() {
        let locks = OutcomeLocks::new();
        let outcome = Uuid::new_v4();
        let guard = locks.lock(outcome).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(outcome).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(locks.lock(Uuid::new_v4()).await);
        drop(guard);

        tokio::time::timeout(Duration::from_millis(500), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_different_outcomes_do_not_block() {
        let locks = OutcomeLocks::new();
        let _a = locks.lock(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;
        assert!(b.is_ok());
    }
}
