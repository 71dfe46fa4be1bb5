//! Per-parent mutual exclusion.
//!
//! The parent's aggregate text and dispatch bookkeeping are the only
//! cross-attachment shared state. Every transcript append and every
//! check-and-dispatch sequence for a given parent must hold that parent's
//! lock, so concurrent completions cannot lose appends or double-dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::Mutex;
use uuid::Uuid;

/// Lazily-populated registry of one async mutex per parent id.
#[derive(Default)]
pub struct ParentLocks {
    locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ParentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for one parent. Callers for the same id always receive
    /// the same underlying mutex.
    pub fn for_parent(&self, parent_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("parent lock registry poisoned");
        locks
            .entry(parent_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_parent_shares_one_lock() {
        let locks = ParentLocks::new();
        let id = Uuid::new_v4();
        let a = locks.for_parent(id);
        let b = locks.for_parent(id);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_distinct_parents_get_distinct_locks() {
        let locks = ParentLocks::new();
        let a = locks.for_parent(Uuid::new_v4());
        let b = locks.for_parent(Uuid::new_v4());
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_lock_serializes_critical_sections() {
        let locks = Arc::new(ParentLocks::new());
        let id = Uuid::new_v4();
        let counter = Arc::new(StdMutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.for_parent(id);
                let _guard = lock.lock().await;
                let value = *counter.lock().unwrap();
                tokio::task::yield_now().await;
                *counter.lock().unwrap() = value + 1;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 8);
    }
}
