//! Fixed-capacity table of live thread objects.
//!
//! Entries are weak references: the registry never keeps an object alive,
//! it only lets [`ThreadManager::current`](super::ThreadManager::current)
//! map a backend handle back to its object. Every access goes through the
//! registry's own [`Mutex`].

use alloc::sync::{Arc, Weak};
use core::cell::UnsafeCell;
use core::fmt;

use log::trace;
use tinytools_hal::{Error, Platform, Result};

use super::object::ThreadObject;
use crate::config::DEFAULT_MAX_THREADS;
use crate::mutex::{BackedMutex, Mutex};

/// Registry of up to `N` threads.
pub struct Registry<P: Platform, const N: usize = DEFAULT_MAX_THREADS> {
    lock: Mutex<BackedMutex<P::Mutex>>,
    slots: UnsafeCell<[Option<Weak<ThreadObject<P>>>; N]>,
}

// SAFETY: `slots` is only touched inside `with_slots`, which holds `lock`.
unsafe impl<P: Platform, const N: usize> Send for Registry<P, N> {}
unsafe impl<P: Platform, const N: usize> Sync for Registry<P, N> {}

impl<P: Platform, const N: usize> Registry<P, N> {
    /// Creates an empty registry guarded by `raw`.
    pub fn new(raw: BackedMutex<P::Mutex>) -> Self {
        trace!("registry: capacity {}, native mutex {}", N, raw.is_native());
        Self {
            lock: Mutex::with_raw(raw),
            slots: UnsafeCell::new(core::array::from_fn(|_| None)),
        }
    }

    fn with_slots<T>(&self, f: impl FnOnce(&mut [Option<Weak<ThreadObject<P>>>; N]) -> T) -> Result<T> {
        self.lock.lock_scoped(|| {
            // SAFETY: the registry lock is held for the whole closure.
            let slots = unsafe { &mut *self.slots.get() };
            f(slots)
        })
    }

    /// Adds `object` to the first free slot.
    ///
    /// Fails with `AlreadyInitialized` if it is already present and with
    /// `NotFound` when every slot is taken.
    pub fn register(&self, object: &Arc<ThreadObject<P>>) -> Result<()> {
        let target = Arc::as_ptr(object);
        self.with_slots(|slots| {
            if slots.iter().flatten().any(|w| w.as_ptr() == target) {
                return Err(Error::AlreadyInitialized);
            }
            let (index, slot) = slots
                .iter_mut()
                .enumerate()
                .find(|(_, s)| s.is_none())
                .ok_or(Error::NotFound)?;
            *slot = Some(Arc::downgrade(object));
            trace!("registry: {} -> slot {}", object.id(), index);
            Ok(())
        })?
    }

    /// Removes `object`; `NotFound` if it is not registered.
    pub fn unregister(&self, object: &ThreadObject<P>) -> Result<()> {
        let target: *const ThreadObject<P> = object;
        self.with_slots(|slots| {
            let (index, slot) = slots
                .iter_mut()
                .enumerate()
                .find(|(_, s)| matches!(s, Some(w) if w.as_ptr() == target))
                .ok_or(Error::NotFound)?;
            *slot = None;
            trace!("registry: {} left slot {}", object.id(), index);
            Ok(())
        })?
    }

    /// Looks up the live object bound to backend `handle`.
    pub fn find_by_handle(&self, handle: P::Handle) -> Option<Arc<ThreadObject<P>>> {
        self.with_slots(|slots| {
            slots
                .iter()
                .flatten()
                .filter_map(Weak::upgrade)
                .find(|object| object.handle() == Some(handle))
        })
        .ok()
        .flatten()
    }

    /// Returns `true` if `object` occupies a slot.
    pub fn contains(&self, object: &ThreadObject<P>) -> bool {
        let target: *const ThreadObject<P> = object;
        self.with_slots(|slots| slots.iter().flatten().any(|w| w.as_ptr() == target))
            .unwrap_or(false)
    }

    /// Frees slots whose object no longer exists and returns how many.
    pub fn cleanup(&self) -> usize {
        self.with_slots(|slots| {
            let mut freed = 0;
            for slot in slots.iter_mut() {
                if matches!(slot, Some(w) if w.strong_count() == 0) {
                    *slot = None;
                    freed += 1;
                }
            }
            if freed > 0 {
                trace!("registry: reclaimed {} stale slots", freed);
            }
            freed
        })
        .unwrap_or(0)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.with_slots(|slots| slots.iter().filter(|s| s.is_some()).count())
            .unwrap_or(0)
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of threads.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<P: Platform, const N: usize> fmt::Debug for Registry<P, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .field("capacity", &N)
            .finish()
    }
}
