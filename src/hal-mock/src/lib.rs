//! Mock backend for exercising the sync core without a real RTOS.
//!
//! [`MockPlatform`] behaves like a small cooperative RTOS port: tasks run on
//! host threads, there is no blocking join, and suspension takes effect at
//! the next `sleep` or `yield_now` the task makes. Every backend call is
//! recorded so tests can assert on what the core asked for.
//!
//! Clones share their task table and call log.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::trace;
use tinytools_common::{Arch, PlatformKind, ThreadLimits};
use tinytools_hal::{Capabilities, Entry, Error, Platform, PlatformInfo, RawMutex, Result, SpawnConfig};

thread_local! {
    static CURRENT: Cell<u32> = const { Cell::new(0) };
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identifier of a mock task. `TaskId(0)` is any thread the mock did not
/// start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

/// A backend call recorded by [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Spawn {
        task: TaskId,
        name: String,
        stack_size: usize,
        priority: i32,
    },
    Join(TaskId),
    Detach(TaskId),
    SetPriority(TaskId, i32),
    Suspend(TaskId),
    Resume(TaskId),
    Sleep(u32),
}

#[derive(Debug, Default)]
struct Task {
    priority: i32,
    suspended: bool,
    detached: bool,
}

#[derive(Debug, Default)]
struct Shared {
    next_id: AtomicU32,
    failing_spawns: AtomicU32,
    calls: Mutex<Vec<Call>>,
    tasks: Mutex<BTreeMap<TaskId, Task>>,
    resumed: Condvar,
}

/// Cooperative RTOS-like backend running tasks on host threads.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    info: PlatformInfo,
    shared: Arc<Shared>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// A FreeRTOS-like profile: suspend supported, no native join,
    /// priorities 0 to 4.
    pub fn new() -> Self {
        Self {
            info: PlatformInfo {
                kind: PlatformKind::FreeRtos,
                arch: Arch::current(),
                capabilities: Capabilities::THREADS
                    | Capabilities::MUTEX
                    | Capabilities::ATOMIC
                    | Capabilities::TIMERS
                    | Capabilities::SUSPEND,
                core_count: 1,
                thread: ThreadLimits {
                    min_stack_size: 128,
                    max_stack_size: 48 * 1024,
                    default_stack_size: 512,
                    min_priority: 0,
                    max_priority: 4,
                },
            },
            shared: Arc::new(Shared {
                next_id: AtomicU32::new(1),
                ..Shared::default()
            }),
        }
    }

    /// Replaces the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.info.capabilities = capabilities;
        self
    }

    /// Replaces the native priority range.
    pub fn with_priority_range(mut self, min: i32, max: i32) -> Self {
        self.info.thread.min_priority = min;
        self.info.thread.max_priority = max;
        self
    }

    /// Makes the next `count` spawns fail.
    pub fn fail_next_spawns(self, count: u32) -> Self {
        self.shared.failing_spawns.store(count, Ordering::SeqCst);
        self
    }

    /// Every call recorded so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.shared.calls).clone()
    }

    /// Number of successful spawns.
    pub fn spawn_count(&self) -> usize {
        lock(&self.shared.calls)
            .iter()
            .filter(|c| matches!(c, Call::Spawn { .. }))
            .count()
    }

    /// Native priority last applied to `task`.
    pub fn priority_of(&self, task: TaskId) -> Option<i32> {
        lock(&self.shared.tasks).get(&task).map(|t| t.priority)
    }

    /// Returns `true` while `task` is suspended.
    pub fn is_suspended(&self, task: TaskId) -> bool {
        lock(&self.shared.tasks).get(&task).is_some_and(|t| t.suspended)
    }

    /// Returns `true` once `task` has been detached.
    pub fn is_detached(&self, task: TaskId) -> bool {
        lock(&self.shared.tasks).get(&task).is_some_and(|t| t.detached)
    }

    fn record(&self, call: Call) {
        trace!("mock: {:?}", call);
        lock(&self.shared.calls).push(call);
    }

    fn check_priority(&self, priority: i32) -> Result<()> {
        let limits = &self.info.thread;
        if (limits.min_priority..=limits.max_priority).contains(&priority) {
            Ok(())
        } else {
            Err(Error::InvalidParameter)
        }
    }

    /// Parks the calling task while it is suspended.
    fn checkpoint(&self) {
        let task = TaskId(CURRENT.with(Cell::get));
        if task.0 == 0 {
            return;
        }
        let mut tasks = lock(&self.shared.tasks);
        while tasks.get(&task).is_some_and(|t| t.suspended) {
            tasks = self
                .shared
                .resumed
                .wait(tasks)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn with_task<T>(&self, task: TaskId, f: impl FnOnce(&mut Task) -> T) -> Result<T> {
        let mut tasks = lock(&self.shared.tasks);
        tasks.get_mut(&task).map(f).ok_or(Error::NotFound)
    }
}

/// A task started by [`MockPlatform`].
#[derive(Debug)]
pub struct MockThread {
    id: TaskId,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl MockThread {
    /// The task identifier.
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Platform for MockPlatform {
    type Handle = TaskId;
    type Thread = MockThread;
    type Mutex = MockMutex;

    fn info(&self) -> PlatformInfo {
        self.info
    }

    fn spawn(&self, config: &SpawnConfig<'_>, entry: Entry) -> Result<MockThread> {
        let failing = self.shared.failing_spawns.load(Ordering::SeqCst);
        if failing > 0 {
            self.shared.failing_spawns.store(failing - 1, Ordering::SeqCst);
            return Err(Error::Unknown);
        }
        self.check_priority(config.priority)?;

        let id = TaskId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.tasks).insert(
            id,
            Task {
                priority: config.priority,
                ..Task::default()
            },
        );
        // Host threads keep their own stack size; the requested one is only
        // recorded.
        let handle = thread::Builder::new()
            .name(config.name.to_string())
            .spawn(move || {
                CURRENT.with(|c| c.set(id.0));
                entry();
            })
            .map_err(|_| Error::OutOfMemory)?;
        self.record(Call::Spawn {
            task: id,
            name: config.name.to_string(),
            stack_size: config.stack_size,
            priority: config.priority,
        });
        Ok(MockThread {
            id,
            join: Mutex::new(Some(handle)),
        })
    }

    fn handle_of(&self, thread: &MockThread) -> TaskId {
        thread.id
    }

    fn current(&self) -> TaskId {
        TaskId(CURRENT.with(Cell::get))
    }

    fn join(&self, thread: &MockThread) -> Result<()> {
        if !self.info.supports(Capabilities::NATIVE_JOIN) {
            return Err(Error::NotImplemented);
        }
        self.record(Call::Join(thread.id));
        let handle = lock(&thread.join).take().ok_or(Error::ThreadJoinFailed)?;
        handle.join().map_err(|_| Error::ThreadJoinFailed)
    }

    fn detach(&self, thread: &MockThread) -> Result<()> {
        self.record(Call::Detach(thread.id));
        drop(lock(&thread.join).take());
        self.with_task(thread.id, |t| t.detached = true)
    }

    fn set_priority(&self, thread: &MockThread, priority: i32) -> Result<()> {
        self.check_priority(priority)?;
        self.record(Call::SetPriority(thread.id, priority));
        self.with_task(thread.id, |t| t.priority = priority)
    }

    fn suspend(&self, thread: &MockThread) -> Result<()> {
        if !self.info.supports(Capabilities::SUSPEND) {
            return Err(Error::NotImplemented);
        }
        self.record(Call::Suspend(thread.id));
        self.with_task(thread.id, |t| t.suspended = true)
    }

    fn resume(&self, thread: &MockThread) -> Result<()> {
        if !self.info.supports(Capabilities::SUSPEND) {
            return Err(Error::NotImplemented);
        }
        self.record(Call::Resume(thread.id));
        self.with_task(thread.id, |t| t.suspended = false)?;
        self.shared.resumed.notify_all();
        Ok(())
    }

    fn sleep(&self, ms: u32) -> Result<()> {
        self.checkpoint();
        self.record(Call::Sleep(ms));
        thread::sleep(Duration::from_millis(u64::from(ms)));
        self.checkpoint();
        Ok(())
    }

    fn yield_now(&self) {
        self.checkpoint();
        thread::yield_now();
    }

    fn new_mutex(&self) -> Result<MockMutex> {
        Ok(MockMutex::default())
    }
}

/// Native mutex of [`MockPlatform`]: a yielding test-and-set flag.
#[derive(Debug, Default)]
pub struct MockMutex {
    locked: AtomicBool,
}

impl RawMutex for MockMutex {
    fn lock(&self) -> Result<()> {
        while self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            thread::yield_now();
        }
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        self.locked
            .compare_exchange(true, false, Ordering::Release, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|_| Error::InvalidParameter)
    }

    fn try_lock(&self) -> Result<()> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|_| Error::Busy)
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    fn destroy(&self) -> Result<()> {
        if self.is_locked() {
            Err(Error::Busy)
        } else {
            Ok(())
        }
    }
}
