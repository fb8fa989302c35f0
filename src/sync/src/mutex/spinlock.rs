//! Dependency-free spinlock built only from [`AtomicInt`].

use core::marker::PhantomData;

use spin::relax::{RelaxStrategy, Spin};
use tinytools_hal::{Error, RawMutex, Result};

use crate::atomic::{AtomicInt, MemoryOrder};

pub(crate) const UNLOCKED: i32 = 0;
pub(crate) const LOCKED: i32 = 1;

/// Ordering of a successful claim.
pub(crate) const CLAIM: MemoryOrder = MemoryOrder::Acquire;
/// Ordering of the release.
pub(crate) const RELEASE: MemoryOrder = MemoryOrder::Release;
/// Ordering of the read-only wait between claims.
pub(crate) const WAIT: MemoryOrder = MemoryOrder::Relaxed;

/// A test-and-set spinlock.
///
/// Waiters busy-wait and call `R::relax()` between attempts, so the lock
/// never blocks in the OS. Only suitable for short critical sections.
///
/// ```
/// use tinytools_sync::mutex::SpinLock;
/// use tinytools_sync::hal::RawMutex;
///
/// let lock: SpinLock = SpinLock::new();
/// lock.lock().unwrap();
/// assert!(lock.try_lock().is_err());
/// lock.unlock().unwrap();
/// ```
pub struct SpinLock<R: RelaxStrategy = Spin> {
    /// 0 = unlocked, 1 = locked.
    flag: AtomicInt,
    _relax: PhantomData<fn() -> R>,
}

impl<R: RelaxStrategy> SpinLock<R> {
    /// Creates an unlocked spinlock.
    pub const fn new() -> Self {
        Self {
            flag: AtomicInt::new(UNLOCKED),
            _relax: PhantomData,
        }
    }

    fn try_claim(&self) -> bool {
        let mut expected = UNLOCKED;
        self.flag.compare_exchange(&mut expected, LOCKED, CLAIM)
    }
}

impl<R: RelaxStrategy> Default for SpinLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RelaxStrategy> core::fmt::Debug for SpinLock<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl<R: RelaxStrategy> RawMutex for SpinLock<R> {
    fn lock(&self) -> Result<()> {
        loop {
            if self.try_claim() {
                return Ok(());
            }
            // Spin on a plain load so waiters don't bounce the cache line.
            while self.flag.load(WAIT) == LOCKED {
                R::relax();
            }
        }
    }

    fn unlock(&self) -> Result<()> {
        let mut expected = LOCKED;
        if self.flag.compare_exchange(&mut expected, UNLOCKED, RELEASE) {
            Ok(())
        } else {
            Err(Error::InvalidParameter)
        }
    }

    fn try_lock(&self) -> Result<()> {
        if self.try_claim() {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    fn is_locked(&self) -> bool {
        self.flag.load(MemoryOrder::Acquire) == LOCKED
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn test_spinlock_uncontended() {
        let lock: SpinLock = SpinLock::new();
        assert!(!lock.is_locked());
        lock.lock().expect("should acquire lock");
        assert!(lock.is_locked());
        lock.unlock().expect("should release lock");
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_spinlock_try_lock_fails_when_locked() {
        let lock: SpinLock = SpinLock::new();
        lock.try_lock().expect("should acquire lock");
        assert_eq!(lock.try_lock(), Err(Error::Busy));
        assert!(lock.is_locked());
        lock.unlock().expect("should release lock");
        lock.try_lock().expect("should acquire lock again");
    }

    #[test]
    fn test_spinlock_unlock_when_unlocked() {
        let lock: SpinLock = SpinLock::new();
        assert_eq!(lock.unlock(), Err(Error::InvalidParameter));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_spinlock_is_locked_is_read_only() {
        let lock: SpinLock = SpinLock::new();
        for _ in 0..3 {
            assert!(!lock.is_locked());
        }
        lock.try_lock().expect("lock still free after queries");
        for _ in 0..3 {
            assert!(lock.is_locked());
        }
        lock.unlock().expect("lock still held after queries");
    }

    #[test]
    fn test_spinlock_mutual_exclusion() {
        struct Shared {
            lock: SpinLock,
            inside: AtomicInt,
            total: AtomicInt,
        }

        let shared = Arc::new(Shared {
            lock: SpinLock::new(),
            inside: AtomicInt::new(0),
            total: AtomicInt::new(0),
        });

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        shared.lock.lock().expect("lock");
                        let before = shared.inside.add(1, MemoryOrder::Relaxed);
                        assert_eq!(before, 0, "two holders inside the critical section");
                        // Non-atomic style read-modify-write, protected by the lock.
                        let v = shared.total.load(MemoryOrder::Relaxed);
                        shared.total.store(v + 1, MemoryOrder::Relaxed);
                        shared.inside.sub(1, MemoryOrder::Relaxed);
                        shared.lock.unlock().expect("unlock");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        assert_eq!(shared.total.load(MemoryOrder::SeqCst), 4000);
    }
}
