use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of named in-process read-write locks.
///
/// Indices use it to serialise multi-step changes to one value directory or
/// one primary key; the entity store around the engine can use its own
/// instance to scope a read-modify-write of a single entity file. Locks are
/// created on first use and dropped again once nobody holds them, so the
/// registry only ever contains keys that are currently busy.
///
/// The registry is not shared between instances and gives no protection
/// against other processes.
///
/// # Examples
///
/// ```
/// use linkdex::common::LockRegistry;
///
/// let locks = LockRegistry::new();
/// let written = locks.write_with("User/ewf4ofk-555", || {
///     // read-modify-write of the entity file goes here
///     true
/// });
/// assert!(written);
/// assert_eq!(locks.lock_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct LockRegistry {
    locks: Arc<RwLock<HashMap<String, Arc<RwLock<()>>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry {
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Runs `f` while holding the write lock for `key`.
    ///
    /// The lock is released when `f` returns or unwinds.
    pub fn write_with<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let registration = self.acquire(key);
        let _guard = registration.lock.write();
        f()
    }

    /// Runs `f` while holding the read lock for `key`.
    pub fn read_with<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let registration = self.acquire(key);
        let _guard = registration.lock.read();
        f()
    }

    /// Runs `f` while holding the write locks for both keys.
    ///
    /// Locks are taken in lexicographic key order so two callers locking the
    /// same pair in opposite order cannot deadlock. Equal keys are locked once.
    pub fn write_pair_with<R>(&self, first: &str, second: &str, f: impl FnOnce() -> R) -> R {
        if first == second {
            return self.write_with(first, f);
        }

        let (low, high) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        self.write_with(low, || self.write_with(high, f))
    }

    /// Number of locks currently held or waited on.
    pub fn lock_count(&self) -> usize {
        self.locks.read().len()
    }

    fn acquire<'a>(&'a self, key: &'a str) -> Registration<'a> {
        let mut locks = self.locks.write();
        let lock = locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone();
        Registration {
            registry: self,
            key,
            lock,
        }
    }
}

// Keeps a lock registered while it is held or waited on; unregisters it on
// drop, including when the closure panics.
struct Registration<'a> {
    registry: &'a LockRegistry,
    key: &'a str,
    lock: Arc<RwLock<()>>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut locks = self.registry.locks.write();
        // only the map and this registration still refer to it
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_new_lock_registry() {
        let lock_registry = LockRegistry::new();
        assert_eq!(lock_registry.lock_count(), 0);
    }

    #[test]
    fn test_write_with_returns_result_and_releases() {
        let lock_registry = LockRegistry::new();
        let value = lock_registry.write_with("PetByColor/Green", || {
            assert_eq!(lock_registry.lock_count(), 1);
            42
        });
        assert_eq!(value, 42);
        assert_eq!(lock_registry.lock_count(), 0);
    }

    #[test]
    fn test_lock_released_when_closure_panics() {
        let lock_registry = LockRegistry::new();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            lock_registry.write_with("User/abcdefg-123", || panic!("write failed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(lock_registry.lock_count(), 0);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            lock_registry.read_with("User/abcdefg-123", || panic!("read failed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(lock_registry.lock_count(), 0);

        // still usable afterwards
        assert_eq!(lock_registry.write_with("User/abcdefg-123", || 1), 1);
    }

    #[test]
    fn test_read_with_nested_reads() {
        let lock_registry = LockRegistry::new();
        let value = lock_registry.read_with("k", || lock_registry.read_with("k", || 7));
        assert_eq!(value, 7);
        assert_eq!(lock_registry.lock_count(), 0);
    }

    #[test]
    fn test_write_pair_with_same_key() {
        let lock_registry = LockRegistry::new();
        let value = lock_registry.write_pair_with("a", "a", || 1);
        assert_eq!(value, 1);
        assert_eq!(lock_registry.lock_count(), 0);
    }

    #[test]
    fn test_write_pair_with_opposite_order_does_not_deadlock() {
        let lock_registry = Arc::new(LockRegistry::new());
        let barrier = Arc::new(Barrier::new(2));
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for (a, b) in [("Green", "Black"), ("Black", "Green")] {
            let registry = lock_registry.clone();
            let barrier = barrier.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    registry.write_pair_with(a, b, || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 200);
        assert_eq!(lock_registry.lock_count(), 0);
    }

    #[test]
    fn test_write_with_is_exclusive() {
        let lock_registry = Arc::new(LockRegistry::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..4 {
            let registry = lock_registry.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    registry.write_with("User/abcdefg-123", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
