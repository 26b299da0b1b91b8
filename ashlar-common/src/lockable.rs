//! Shared/exclusive access wrapper for the design container. The
//! pipeline worker holds the exclusive guard for the duration of a stage
//! while viewers may take concurrent shared guards between stages.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct Lockable<T> {
    inner: RwLock<T>,
}

impl<T> Lockable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Scoped shared access. A panic inside an earlier exclusive guard
    /// does not wedge the container; the pipeline reports such a stage as
    /// failed and later stages still need to read the design.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Scoped exclusive access.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_readers() {
        let lock = Arc::new(Lockable::new(42));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || *lock.read())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 42);
        }
    }

    #[test]
    fn exclusive_writer() {
        let lock = Lockable::new(Vec::new());
        lock.write().push(1);
        lock.write().push(2);
        assert_eq!(*lock.read(), vec![1, 2]);
    }
}
