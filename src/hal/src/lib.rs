//! TinyTools platform backend contract.
//!
//! This crate defines the traits a target implements so the sync core can
//! run on it: a general purpose OS, an RTOS, or a bare-metal port. The core
//! never issues system calls itself; every thread and native mutex operation
//! goes through [`Platform`] and [`RawMutex`].
//!
//! Capability-gated operations have default bodies returning
//! [`Error::NotImplemented`], so every backend exposes the same surface and
//! only overrides what it can actually do.

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use core::fmt::Debug;

pub use tinytools_common::{Capabilities, Error, PlatformInfo, Result};

/// Start routine handed to [`Platform::spawn`].
pub type Entry = Box<dyn FnOnce() + Send + 'static>;

/// Parameters for starting a backend thread.
#[derive(Debug, Clone, Copy)]
pub struct SpawnConfig<'a> {
    /// Display name, if the backend supports naming.
    pub name: &'a str,
    /// Requested stack size in bytes, 0 for the backend default.
    pub stack_size: usize,
    /// Native priority, already mapped into the backend's range.
    pub priority: i32,
}

/// A mutual exclusion primitive provided by the backend.
///
/// Lock state is not tied to a guard: `lock` and `unlock` may be called as a
/// pair from the same thread, mirroring the native APIs this wraps.
pub trait RawMutex: Send + Sync {
    /// Blocks until the lock is acquired.
    fn lock(&self) -> Result<()>;

    /// Releases the lock. Fails with `InvalidParameter` if it is not held.
    fn unlock(&self) -> Result<()>;

    /// Makes one attempt to acquire the lock; `Busy` if it is held.
    fn try_lock(&self) -> Result<()>;

    /// Reports whether the lock is held without changing its state.
    fn is_locked(&self) -> bool;

    /// Releases backend resources. A backend may refuse while locked.
    fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

/// Thread and mutex services of one target.
pub trait Platform: Send + Sync + 'static {
    /// Identity of a running thread. Compared by value, never by memory layout.
    type Handle: Copy + Eq + Debug + Send + Sync + 'static;

    /// An owned backend thread (join handle, task control block, ...).
    type Thread: Send + Sync + 'static;

    /// Native mutex type.
    type Mutex: RawMutex;

    /// Static description of this backend. Queried once by the core.
    fn info(&self) -> PlatformInfo;

    /// Starts a unit of execution running `entry`.
    fn spawn(&self, config: &SpawnConfig<'_>, entry: Entry) -> Result<Self::Thread>;

    /// Returns the identity of a spawned thread.
    fn handle_of(&self, thread: &Self::Thread) -> Self::Handle;

    /// Returns the identity of the calling thread.
    fn current(&self) -> Self::Handle;

    /// Blocks until `thread` finishes.
    ///
    /// Backends without `Capabilities::NATIVE_JOIN` leave the default, and
    /// the core falls back to polling the thread state.
    fn join(&self, thread: &Self::Thread) -> Result<()> {
        let _ = thread;
        Err(Error::NotImplemented)
    }

    /// Lets `thread` run to completion without being joined.
    fn detach(&self, thread: &Self::Thread) -> Result<()>;

    /// Applies a native priority to `thread`.
    fn set_priority(&self, thread: &Self::Thread, priority: i32) -> Result<()> {
        let _ = (thread, priority);
        Err(Error::NotImplemented)
    }

    /// Suspends `thread`. Requires `Capabilities::SUSPEND`.
    fn suspend(&self, thread: &Self::Thread) -> Result<()> {
        let _ = thread;
        Err(Error::NotImplemented)
    }

    /// Resumes a suspended `thread`. Requires `Capabilities::SUSPEND`.
    fn resume(&self, thread: &Self::Thread) -> Result<()> {
        let _ = thread;
        Err(Error::NotImplemented)
    }

    /// Puts the calling thread to sleep.
    fn sleep(&self, ms: u32) -> Result<()>;

    /// Gives up the rest of the calling thread's time slice.
    fn yield_now(&self);

    /// Creates a native mutex.
    fn new_mutex(&self) -> Result<Self::Mutex> {
        Err(Error::NotImplemented)
    }
}
