//! # cidata Pool Lock Module
//!
//! Serializes work against one storage pool. A pool must be refreshed right
//! before a volume is created in it, and another creator slipping in between
//! would act on stale pool state; holding the pool's lock across
//! refresh → create → upload rules that out.
//!
//! [`PoolLockRegistry`] keeps one mutex per pool name. Entries are created on
//! first use and kept for the registry's lifetime. The registry is a cheap
//! `Clone` handle: clones share the same locks, separate registries do not.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct PoolLockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl PoolLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock of `pool_name`. The lock is released
    /// on every exit path, panics included.
    pub fn with_pool_lock<T>(&self, pool_name: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(pool_name);
        // the mutex guards no data, so a poisoned lock is still usable
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of distinct pool names locked so far.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, pool_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(pool_name.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_pool_runs_one_at_a_time() {
        let registry = PoolLockRegistry::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    registry.with_pool_lock("default", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_pools_do_not_block_each_other() {
        let registry = PoolLockRegistry::new();
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        let (locked_tx, locked_rx) = mpsc::channel::<()>();

        let holder = {
            let registry = registry.clone();
            thread::spawn(move || {
                registry.with_pool_lock("pool-a", || {
                    locked_tx.send(()).unwrap();
                    hold_rx.recv().unwrap();
                });
            })
        };
        locked_rx.recv().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        {
            let registry = registry.clone();
            thread::spawn(move || {
                registry.with_pool_lock("pool-b", || done_tx.send(()).unwrap());
            });
        }
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok(), "pool-b waited for pool-a");

        hold_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lock_is_released_after_failure_and_panic() {
        let registry = PoolLockRegistry::new();
        let result: Result<(), &str> = registry.with_pool_lock("default", || Err("refresh failed"));
        assert!(result.is_err());

        let cloned = registry.clone();
        let panicked = thread::spawn(move || cloned.with_pool_lock("default", || panic!("boom"))).join();
        assert!(panicked.is_err());

        assert_eq!(registry.with_pool_lock("default", || 42), 42);
    }

    #[test]
    fn separate_registries_are_independent() {
        let first = PoolLockRegistry::new();
        let second = PoolLockRegistry::new();
        first.with_pool_lock("default", || {
            assert_eq!(second.with_pool_lock("default", || 1), 1);
        });
        assert_eq!(second.len(), 1);
        assert!(!first.is_empty());
    }
}
