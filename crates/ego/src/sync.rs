//! `sync.Mutex` and `sync.WaitGroup` values.
//!
//! Unlike a guard based lock, an Ego mutex may be unlocked by a different
//! task than the one that locked it, so both are built from a
//! `parking_lot` mutex over plain state plus a condition variable.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex as Lock};

use crate::errors::{EgoError, ErrorKind, RunResult};

#[derive(Debug, Default)]
struct MutexInner {
    locked: Lock<bool>,
    released: Condvar,
}

/// A shared mutual exclusion lock.
#[derive(Debug, Clone, Default)]
pub struct Mutex(Arc<MutexInner>);

impl Mutex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is free, then takes it.
    pub fn lock(&self) {
        let mut locked = self.0.locked.lock();
        while *locked {
            self.0.released.wait(&mut locked);
        }
        *locked = true;
    }

    /// Releases the lock; releasing an unlocked mutex is a panic.
    pub fn unlock(&self) -> RunResult<()> {
        let mut locked = self.0.locked.lock();
        if !*locked {
            return Err(EgoError::new(ErrorKind::Panic).context("unlock of unlocked mutex"));
        }
        *locked = false;
        self.0.released.notify_one();
        Ok(())
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        *self.0.locked.lock()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Default)]
struct WaitGroupInner {
    count: Lock<i64>,
    zero: Condvar,
}

/// A counter tasks can wait on until it reaches zero.
#[derive(Debug, Clone, Default)]
pub struct WaitGroup(Arc<WaitGroupInner>);

impl WaitGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjusts the counter by `delta`; a negative counter is a panic.
    pub fn add(&self, delta: i64) -> RunResult<()> {
        let mut count = self.0.count.lock();
        *count += delta;
        if *count < 0 {
            *count = 0;
            self.0.zero.notify_all();
            return Err(EgoError::new(ErrorKind::Panic).context("negative WaitGroup counter"));
        }
        if *count == 0 {
            self.0.zero.notify_all();
        }
        Ok(())
    }

    pub fn done(&self) -> RunResult<()> {
        self.add(-1)
    }

    /// Blocks until the counter is zero.
    pub fn wait(&self) {
        let mut count = self.0.count.lock();
        while *count > 0 {
            self.0.zero.wait(&mut count);
        }
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        *self.0.count.lock()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_unlock_from_another_thread() {
        let m = Mutex::new();
        m.lock();
        let other = m.clone();
        thread::spawn(move || other.unlock()).join().unwrap().unwrap();
        assert!(!m.is_locked());
        assert_eq!(m.unlock().unwrap_err().kind(), ErrorKind::Panic);
    }

    #[test]
    fn test_waitgroup_releases_waiters() {
        let wg = WaitGroup::new();
        wg.add(3).unwrap();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let wg = wg.clone();
                thread::spawn(move || wg.done())
            })
            .collect();
        wg.wait();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(wg.count(), 0);
        assert_eq!(wg.done().unwrap_err().kind(), ErrorKind::Panic);
    }
}
