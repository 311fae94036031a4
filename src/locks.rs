//! Per-resource critical sections
//!
//! Every read-modify-write on a persisted file runs while holding the lock
//! for that file's path, so two handlers touching the same chat's tasks or
//! day log serialize instead of overwriting each other.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lazily created mutex per filesystem path
#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `path`. The entry is dropped
    /// again once no other caller holds or waits on it.
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(path);
        let out = {
            let _guard = lock_ignoring_poison(&lock);
            f()
        };
        self.release(path, lock);
        out
    }

    fn release(&self, path: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = lock_ignoring_poison(&self.locks);
        // One reference in the map plus ours: nobody else is interested
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = lock_ignoring_poison(&self.locks);
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of paths currently locked or waited on
    pub fn len(&self) -> usize {
        lock_ignoring_poison(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Poison is ignored; the guarded value is `()` or a plain map.
fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_entries_released_after_use() {
        let locks = PathLocks::new();
        for i in 0..500 {
            locks.with_lock(&PathBuf::from(format!("/day/{}", i)), || ());
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn test_entry_held_while_in_use() {
        let locks = PathLocks::new();
        locks.with_lock(Path::new("/a"), || {
            assert_eq!(locks.len(), 1);
            locks.with_lock(Path::new("/b"), || assert_eq!(locks.len(), 2));
            assert_eq!(locks.len(), 1);
        });
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_serializes_read_modify_write() {
        let locks = Arc::new(PathLocks::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        locks.with_lock(Path::new("/shared"), || {
                            // Deliberately non-atomic read then write.
                            let seen = counter.load(Ordering::SeqCst);
                            thread::yield_now();
                            counter.store(seen + 1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 800);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_poisoned_lock_recovers() {
        let locks = Arc::new(PathLocks::new());
        let cloned = locks.clone();
        let _ = thread::spawn(move || {
            cloned.with_lock(Path::new("/p"), || panic!("boom"));
        })
        .join();

        let value = locks.with_lock(Path::new("/p"), || 7);
        assert_eq!(value, 7);
    }
}
