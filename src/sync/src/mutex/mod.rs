//! Mutual exclusion with an explicit init/destroy lifecycle.
//!
//! [`Mutex`] wraps any [`RawMutex`] and adds the lifecycle checks every
//! backend shares: operations on a mutex that was never initialized, or has
//! been destroyed, fail with [`Error::NotInitialized`].
//!
//! Two backings are selected at compile time through the type parameter:
//!
//! - [`SpinLock`] (the default): a spinlock built only from [`AtomicInt`].
//! - A backend's native mutex, `Platform::Mutex`, created with
//!   [`Mutex::with_raw`]`(platform.new_mutex()?)`.
//!
//! [`BackedMutex`] makes the same choice at run time from the backend's
//! capabilities; the thread registry uses it.
//!
//! # Example
//!
//! ```
//! use tinytools_sync::mutex::Mutex;
//! use tinytools_sync::Error;
//!
//! let mutex = Mutex::new();
//! mutex.lock().unwrap();
//! assert_eq!(mutex.try_lock(), Err(Error::Busy));
//! mutex.unlock().unwrap();
//! mutex.destroy().unwrap();
//! assert_eq!(mutex.lock(), Err(Error::NotInitialized));
//! ```

pub(crate) mod spinlock;

pub use self::spinlock::SpinLock;

use tinytools_hal::{Capabilities, Error, Platform, PlatformInfo, RawMutex, Result};

use crate::atomic::{AtomicInt, MemoryOrder};

const UNINITIALIZED: i32 = 0;
const READY: i32 = 1;
const DESTROYED: i32 = 2;
// Held by `destroy` while it owns the raw lock; rolls back to READY if the
// teardown is refused.
const DESTROYING: i32 = 3;

/// A mutex backed by `R`, with an init/destroy lifecycle.
pub struct Mutex<R: RawMutex = SpinLock> {
    raw: R,
    /// Lifecycle: uninitialized, ready, destroying or destroyed.
    status: AtomicInt,
}

impl Mutex<SpinLock> {
    /// Creates an initialized, unlocked spinlock-backed mutex.
    pub const fn new() -> Self {
        Self::with_raw(SpinLock::new())
    }
}

impl Default for Mutex<SpinLock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RawMutex> Mutex<R> {
    /// Creates an initialized mutex over an existing raw mutex.
    pub const fn with_raw(raw: R) -> Self {
        Self {
            raw,
            status: AtomicInt::new(READY),
        }
    }

    /// Creates a mutex that must be [`init`](Self::init)ialized before use.
    pub const fn uninit(raw: R) -> Self {
        Self {
            raw,
            status: AtomicInt::new(UNINITIALIZED),
        }
    }

    /// Moves an uninitialized or destroyed mutex to the unlocked state.
    ///
    /// Fails with `AlreadyInitialized` on a mutex that is ready (or being
    /// destroyed).
    pub fn init(&self) -> Result<()> {
        for from in [UNINITIALIZED, DESTROYED] {
            let mut expected = from;
            if self.status.compare_exchange(&mut expected, READY, MemoryOrder::AcqRel) {
                return Ok(());
            }
            if matches!(expected, READY | DESTROYING) {
                return Err(Error::AlreadyInitialized);
            }
        }
        // Raced with another init or destroy; report what is there now.
        match self.status.load(MemoryOrder::Acquire) {
            READY | DESTROYING => Err(Error::AlreadyInitialized),
            _ => Err(Error::Busy),
        }
    }

    /// The backing raw mutex.
    pub fn raw(&self) -> &R {
        &self.raw
    }

    /// Returns `true` between a successful init and destroy.
    pub fn is_initialized(&self) -> bool {
        matches!(self.status.load(MemoryOrder::Acquire), READY | DESTROYING)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    /// Checks the lifecycle again once the raw lock is held; a caller that
    /// slipped past the entry check while `destroy` ran gives the lock back.
    fn confirm_held(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.raw.unlock()?;
        Err(Error::NotInitialized)
    }

    /// Tears the mutex down.
    ///
    /// Refused with `Busy` while the lock is held, or when the backing
    /// refuses; in both cases the mutex stays ready and usable.
    pub fn destroy(&self) -> Result<()> {
        let mut expected = READY;
        if !self.status.compare_exchange(&mut expected, DESTROYING, MemoryOrder::AcqRel) {
            return match expected {
                DESTROYING => Err(Error::Busy),
                _ => Err(Error::NotInitialized),
            };
        }
        if let Err(err) = self.raw.try_lock() {
            self.status.store(READY, MemoryOrder::Release);
            return Err(err);
        }
        // Anyone acquiring the raw lock after this sees DESTROYED.
        self.status.store(DESTROYED, MemoryOrder::Release);
        self.raw.unlock()?;
        loop {
            match self.raw.destroy() {
                Ok(()) => return Ok(()),
                // A late locker holds it just long enough to back out.
                Err(Error::Busy) => core::hint::spin_loop(),
                Err(err) => {
                    self.status.store(READY, MemoryOrder::Release);
                    return Err(err);
                }
            }
        }
    }

    /// Blocks until the lock is acquired.
    pub fn lock(&self) -> Result<()> {
        self.ensure_ready()?;
        self.raw.lock()?;
        self.confirm_held()
    }

    /// Releases the lock.
    pub fn unlock(&self) -> Result<()> {
        self.ensure_ready()?;
        self.raw.unlock()
    }

    /// Makes a single attempt to acquire the lock; `Busy` if it is held.
    pub fn try_lock(&self) -> Result<()> {
        self.ensure_ready()?;
        self.raw.try_lock()?;
        self.confirm_held()
    }

    /// Reports whether the mutex is held. Always `false` when not ready.
    pub fn is_locked(&self) -> bool {
        self.is_initialized() && self.raw.is_locked()
    }

    /// Locks and returns a guard that unlocks when dropped.
    pub fn guard(&self) -> Result<MutexGuard<'_, R>> {
        self.lock()?;
        Ok(MutexGuard { mutex: self })
    }

    /// Runs `f` with the lock held.
    pub fn lock_scoped<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        let guard = self.guard()?;
        let out = f();
        guard.release()?;
        Ok(out)
    }
}

/// Raw mutex chosen at run time: the backend's native mutex when it offers
/// one, the spinlock otherwise.
pub enum BackedMutex<R: RawMutex> {
    /// The backend's own mutex.
    Native(R),
    /// Fallback spinlock.
    Spin(SpinLock),
}

impl<R: RawMutex> BackedMutex<R> {
    /// Picks the backing for `platform`, described by `info`.
    ///
    /// A backend that advertises `MUTEX` but answers `NotImplemented` gets
    /// the spinlock; any other creation failure is returned.
    pub fn for_platform<P: Platform<Mutex = R>>(platform: &P, info: &PlatformInfo) -> Result<Self> {
        if !info.supports(Capabilities::MUTEX) {
            return Ok(BackedMutex::Spin(SpinLock::new()));
        }
        match platform.new_mutex() {
            Ok(raw) => Ok(BackedMutex::Native(raw)),
            Err(Error::NotImplemented) => Ok(BackedMutex::Spin(SpinLock::new())),
            Err(err) => Err(err),
        }
    }

    /// Returns `true` when the backend's native mutex is in use.
    pub fn is_native(&self) -> bool {
        matches!(self, BackedMutex::Native(_))
    }
}

impl<R: RawMutex> RawMutex for BackedMutex<R> {
    fn lock(&self) -> Result<()> {
        match self {
            BackedMutex::Native(raw) => raw.lock(),
            BackedMutex::Spin(raw) => raw.lock(),
        }
    }

    fn unlock(&self) -> Result<()> {
        match self {
            BackedMutex::Native(raw) => raw.unlock(),
            BackedMutex::Spin(raw) => raw.unlock(),
        }
    }

    fn try_lock(&self) -> Result<()> {
        match self {
            BackedMutex::Native(raw) => raw.try_lock(),
            BackedMutex::Spin(raw) => raw.try_lock(),
        }
    }

    fn is_locked(&self) -> bool {
        match self {
            BackedMutex::Native(raw) => raw.is_locked(),
            BackedMutex::Spin(raw) => raw.is_locked(),
        }
    }

    fn destroy(&self) -> Result<()> {
        match self {
            BackedMutex::Native(raw) => raw.destroy(),
            BackedMutex::Spin(raw) => raw.destroy(),
        }
    }
}

/// RAII guard that releases the mutex when dropped.
pub struct MutexGuard<'a, R: RawMutex> {
    mutex: &'a Mutex<R>,
}

impl<R: RawMutex> MutexGuard<'_, R> {
    /// Releases the lock, reporting a backend failure.
    pub fn release(self) -> Result<()> {
        let mutex = self.mutex;
        core::mem::forget(self);
        mutex.raw.unlock()
    }
}

impl<R: RawMutex> Drop for MutexGuard<'_, R> {
    fn drop(&mut self) {
        if let Err(err) = self.mutex.raw.unlock() {
            log::warn!("mutex unlock on guard drop failed: {}", err);
        }
    }
}
