//! Hosted backend on `std::thread`.

use std::io;
use std::string::ToString;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use log::debug;
use tinytools_common::{Arch, PlatformKind, ThreadLimits};
use tinytools_hal::{Capabilities, Entry, Error, Platform, PlatformInfo, RawMutex, Result, SpawnConfig};

const MIN_STACK_SIZE: usize = 16 * 1024;
const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

// A panicking holder cannot leave these guards' data inconsistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend running each thread on an OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdPlatform;

impl StdPlatform {
    /// Creates the backend.
    pub const fn new() -> Self {
        StdPlatform
    }

    fn kind() -> PlatformKind {
        if cfg!(target_os = "linux") {
            PlatformKind::Linux
        } else if cfg!(target_os = "windows") {
            PlatformKind::Windows
        } else if cfg!(target_os = "macos") {
            PlatformKind::MacOs
        } else {
            PlatformKind::Unknown
        }
    }

    #[cfg(unix)]
    fn priority_range() -> (i32, i32) {
        // SAFETY: pure queries on a constant policy.
        let (min, max) = unsafe {
            (
                libc::sched_get_priority_min(libc::SCHED_OTHER),
                libc::sched_get_priority_max(libc::SCHED_OTHER),
            )
        };
        if min < 0 || max < min {
            (0, 0)
        } else {
            (min, max)
        }
    }

    #[cfg(not(unix))]
    fn priority_range() -> (i32, i32) {
        (0, 0)
    }
}

#[cfg(unix)]
fn map_errno(code: libc::c_int) -> Error {
    match code {
        libc::EINVAL | libc::EPERM => Error::InvalidParameter,
        libc::ESRCH => Error::NotFound,
        _ => Error::Unknown,
    }
}

fn map_spawn_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::OutOfMemory => Error::OutOfMemory,
        _ => Error::ThreadCreateFailed,
    }
}

/// An OS thread started by [`StdPlatform`].
pub struct StdThread {
    id: ThreadId,
    /// `None` once joined or detached.
    join: Mutex<Option<JoinHandle<()>>>,
}

impl StdThread {
    /// OS thread identifier.
    pub fn id(&self) -> ThreadId {
        self.id
    }
}

impl core::fmt::Debug for StdThread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StdThread")
            .field("id", &self.id)
            .field("attached", &lock(&self.join).is_some())
            .finish()
    }
}

impl Platform for StdPlatform {
    type Handle = ThreadId;
    type Thread = StdThread;
    type Mutex = StdRawMutex;

    fn info(&self) -> PlatformInfo {
        let (min_priority, max_priority) = Self::priority_range();
        let core_count = thread::available_parallelism()
            .map(|n| n.get().min(usize::from(u16::MAX)) as u16)
            .unwrap_or(0);
        PlatformInfo {
            kind: Self::kind(),
            arch: Arch::current(),
            capabilities: Capabilities::THREADS
                | Capabilities::MUTEX
                | Capabilities::TLS
                | Capabilities::ATOMIC
                | Capabilities::TIMERS
                | Capabilities::NATIVE_JOIN,
            core_count,
            thread: ThreadLimits {
                min_stack_size: MIN_STACK_SIZE,
                max_stack_size: 0,
                default_stack_size: DEFAULT_STACK_SIZE,
                min_priority,
                max_priority,
            },
        }
    }

    fn spawn(&self, config: &SpawnConfig<'_>, entry: Entry) -> Result<StdThread> {
        let mut builder = thread::Builder::new().name(config.name.to_string());
        if config.stack_size != 0 {
            builder = builder.stack_size(config.stack_size);
        }
        let handle = builder.spawn(move || entry()).map_err(map_spawn_error)?;
        let thread = StdThread {
            id: handle.thread().id(),
            join: Mutex::new(Some(handle)),
        };
        if let Err(err) = self.set_priority(&thread, config.priority) {
            debug!("'{}': initial priority {} not applied: {}", config.name, config.priority, err);
        }
        Ok(thread)
    }

    fn handle_of(&self, thread: &StdThread) -> ThreadId {
        thread.id
    }

    fn current(&self) -> ThreadId {
        thread::current().id()
    }

    fn join(&self, thread: &StdThread) -> Result<()> {
        let handle = lock(&thread.join).take().ok_or(Error::ThreadJoinFailed)?;
        handle.join().map_err(|_| Error::ThreadJoinFailed)
    }

    fn detach(&self, thread: &StdThread) -> Result<()> {
        drop(lock(&thread.join).take());
        Ok(())
    }

    #[cfg(unix)]
    fn set_priority(&self, thread: &StdThread, priority: i32) -> Result<()> {
        use std::os::unix::thread::JoinHandleExt;

        // Held across the calls so the thread cannot be joined meanwhile.
        let guard = lock(&thread.join);
        let handle = guard.as_ref().ok_or(Error::NotFound)?;
        let pthread = handle.as_pthread_t();

        let mut policy: libc::c_int = 0;
        // SAFETY: sched_param is a plain C struct; all zeroes is valid.
        let mut param: libc::sched_param = unsafe { core::mem::zeroed() };
        // SAFETY: `pthread` belongs to a thread that is neither joined nor
        // detached while `guard` is held.
        let rc = unsafe { libc::pthread_getschedparam(pthread, &mut policy, &mut param) };
        if rc != 0 {
            return Err(map_errno(rc));
        }
        param.sched_priority = priority;
        // SAFETY: as above.
        let rc = unsafe { libc::pthread_setschedparam(pthread, policy, &param) };
        if rc != 0 {
            return Err(map_errno(rc));
        }
        Ok(())
    }

    fn sleep(&self, ms: u32) -> Result<()> {
        thread::sleep(Duration::from_millis(u64::from(ms)));
        Ok(())
    }

    fn yield_now(&self) {
        thread::yield_now();
    }

    fn new_mutex(&self) -> Result<StdRawMutex> {
        Ok(StdRawMutex::new())
    }
}

/// Blocking mutex on `std::sync::Mutex` and `Condvar`.
///
/// Unlike `std::sync::Mutex` the lock is not tied to a guard, so it can be
/// released from a different call than the one that took it.
#[derive(Debug, Default)]
pub struct StdRawMutex {
    locked: Mutex<bool>,
    released: Condvar,
}

impl StdRawMutex {
    /// Creates an unlocked mutex.
    pub const fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            released: Condvar::new(),
        }
    }
}

impl RawMutex for StdRawMutex {
    fn lock(&self) -> Result<()> {
        let mut locked = lock(&self.locked);
        while *locked {
            locked = self.released.wait(locked).unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        let mut locked = lock(&self.locked);
        if !*locked {
            return Err(Error::InvalidParameter);
        }
        *locked = false;
        drop(locked);
        self.released.notify_one();
        Ok(())
    }

    fn try_lock(&self) -> Result<()> {
        let mut locked = lock(&self.locked);
        if *locked {
            return Err(Error::Busy);
        }
        *locked = true;
        Ok(())
    }

    fn is_locked(&self) -> bool {
        *lock(&self.locked)
    }

    fn destroy(&self) -> Result<()> {
        if self.is_locked() {
            Err(Error::Busy)
        } else {
            Ok(())
        }
    }
}
