//! Thread lifecycle manager.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use log::{debug, trace, warn};
use tinytools_hal::{Capabilities, Entry, Error, Platform, PlatformInfo, Result, SpawnConfig};

use super::object::{ObjectId, ReturnSlot, ThreadObject, ThreadRef};
use super::registry::Registry;
use super::{Attributes, Priority, State};
use crate::config::{DEFAULT_MAX_THREADS, DEFAULT_THREAD_NAME, JOIN_POLL_INTERVAL_MS};
use crate::mutex::BackedMutex;

struct Core<P: Platform, const N: usize> {
    platform: P,
    info: PlatformInfo,
    registry: Registry<P, N>,
}

impl<P: Platform, const N: usize> Core<P, N> {
    /// Unregisters `object`, tolerating a concurrent unregister.
    fn release_slot(&self, object: &ThreadObject<P>) {
        match self.registry.unregister(object) {
            Ok(()) | Err(Error::NotFound) => {}
            Err(err) => warn!("thread {}: unregister failed: {}", object.id(), err),
        }
    }
}

/// Creates, joins and destroys threads on backend `P`.
///
/// The manager owns the thread registry; clones share it. Up to `N` threads
/// may be registered at once.
pub struct ThreadManager<P: Platform, const N: usize = DEFAULT_MAX_THREADS> {
    core: Arc<Core<P, N>>,
}

impl<P: Platform, const N: usize> Clone for ThreadManager<P, N> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<P: Platform, const N: usize> ThreadManager<P, N> {
    /// Binds a manager to `platform`.
    ///
    /// The backend description is read here once and cached. Fails with
    /// `PlatformNotSupported` if the backend cannot run threads.
    pub fn new(platform: P) -> Result<Self> {
        let info = platform.info();
        if !info.supports(Capabilities::THREADS) {
            return Err(Error::PlatformNotSupported);
        }
        let registry = Registry::new(BackedMutex::for_platform(&platform, &info)?);
        debug!(
            "thread manager: {:?}/{:?}, caps {:?}, {} slots",
            info.kind, info.arch, info.capabilities, N
        );
        Ok(Self {
            core: Arc::new(Core {
                platform,
                info,
                registry,
            }),
        })
    }

    /// The backend.
    pub fn platform(&self) -> &P {
        &self.core.platform
    }

    /// The cached backend description.
    pub fn info(&self) -> &PlatformInfo {
        &self.core.info
    }

    /// The thread registry.
    pub fn registry(&self) -> &Registry<P, N> {
        &self.core.registry
    }

    /// Default attributes with the backend's default stack size filled in.
    pub fn attributes_default(&self) -> Attributes {
        Attributes {
            stack_size: self.core.info.thread.default_stack_size,
            ..Attributes::default()
        }
    }

    fn resolve(&self, attrs: &Attributes) -> Result<Attributes> {
        let limits = &self.core.info.thread;
        let mut resolved = attrs.clone();
        if resolved.name.is_empty() {
            resolved.name = String::from(DEFAULT_THREAD_NAME);
        }
        if resolved.name.contains('\0') {
            return Err(Error::InvalidParameter);
        }
        if resolved.stack_size == 0 {
            resolved.stack_size = limits.default_stack_size;
        }
        if resolved.stack_size != 0 {
            let too_small = resolved.stack_size < limits.min_stack_size;
            let too_large = limits.max_stack_size != 0 && resolved.stack_size > limits.max_stack_size;
            if too_small || too_large {
                return Err(Error::InvalidParameter);
            }
        }
        Ok(resolved)
    }

    /// Starts a thread running `f`.
    ///
    /// The thread is registered before `f` is invoked, so [`current`](Self::current)
    /// works from its first instruction. If the backend starts the thread but
    /// the registry is full, the thread is detached and left to finish on its
    /// own and `NotFound` is returned.
    pub fn create<F, T>(&self, attrs: &Attributes, f: F) -> Result<ThreadHandle<P, T, N>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let attrs = self.resolve(attrs)?;
        let object = Arc::new(ThreadObject::new(&attrs));
        let slot = Arc::new(ReturnSlot::new());

        let entry: Entry = {
            let object = Arc::clone(&object);
            let slot = Arc::clone(&slot);
            let core = Arc::clone(&self.core);
            Box::new(move || {
                let finish = Finish { object, core };
                finish.object.wait_for_gate(&finish.core.platform);
                finish.object.publish(State::Running);
                let value = f();
                // SAFETY: this routine is the only writer and `finish`
                // publishes Terminated after the write.
                unsafe { slot.put(value) };
                drop(finish);
            })
        };

        let config = SpawnConfig {
            name: object.name(),
            stack_size: attrs.stack_size,
            priority: attrs.priority.to_native(&self.core.info.thread),
        };
        let thread = self.core.platform.spawn(&config, entry).map_err(|err| {
            warn!("thread '{}': backend spawn failed: {}", attrs.name, err);
            match err {
                Error::OutOfMemory => Error::OutOfMemory,
                _ => Error::ThreadCreateFailed,
            }
        })?;
        let handle = self.core.platform.handle_of(&thread);
        object.bind(thread, handle);

        if let Err(err) = self.core.registry.register(&object) {
            warn!(
                "thread {} '{}': started but not registered ({}), detaching",
                object.id(),
                object.name(),
                err
            );
            object.mark_detached();
            if let Ok(binding) = object.binding() {
                if let Err(err) = self.core.platform.detach(&binding.thread) {
                    warn!("thread {}: detach failed: {}", object.id(), err);
                }
            }
            object.open_gate();
            return Err(err);
        }
        object.open_gate();

        debug!(
            "thread {} '{}' created: stack {}, priority {:?}",
            object.id(),
            object.name(),
            attrs.stack_size,
            attrs.priority
        );
        Ok(ThreadHandle {
            object,
            slot,
            core: Arc::clone(&self.core),
            joined: false,
            released: false,
        })
    }

    fn check_owner<T>(&self, handle: &ThreadHandle<P, T, N>) -> Result<()> {
        if Arc::ptr_eq(&self.core, &handle.core) {
            Ok(())
        } else {
            Err(Error::InvalidParameter)
        }
    }

    /// Waits for the thread to finish and returns what its function returned.
    ///
    /// Fails with `ThreadJoinFailed` if the function unwound or the handle
    /// was already joined.
    pub fn join<T>(&self, handle: &mut ThreadHandle<P, T, N>) -> Result<T> {
        self.check_owner(handle)?;
        if handle.joined {
            return Err(Error::ThreadJoinFailed);
        }
        handle.joined = true;

        let object = &handle.object;
        if self.core.info.supports(Capabilities::NATIVE_JOIN) {
            let binding = object.binding()?;
            self.core.platform.join(&binding.thread).map_err(|err| {
                warn!("thread {}: backend join failed: {}", object.id(), err);
                Error::ThreadJoinFailed
            })?;
        } else {
            while object.state() != State::Terminated {
                if self.core.platform.sleep(JOIN_POLL_INTERVAL_MS).is_err() {
                    self.core.platform.yield_now();
                }
            }
        }

        if object.state() != State::Terminated {
            return Err(Error::ThreadJoinFailed);
        }
        // SAFETY: Terminated was observed with Acquire ordering above and the
        // handle is borrowed mutably.
        let value = unsafe { handle.slot.take() };
        debug!("thread {} joined", object.id());
        value.ok_or(Error::ThreadJoinFailed)
    }

    /// Current state of the thread. Never blocks.
    pub fn get_state<T>(&self, handle: &ThreadHandle<P, T, N>) -> State {
        handle.object.state()
    }

    /// Applies `priority`, mapped onto the backend's native range.
    pub fn set_priority<T>(&self, handle: &ThreadHandle<P, T, N>, priority: Priority) -> Result<()> {
        self.check_owner(handle)?;
        let object = &handle.object;
        if object.state() == State::Terminated {
            return Err(Error::InvalidParameter);
        }
        let native = priority.to_native(&self.core.info.thread);
        let binding = object.binding()?;
        self.core
            .platform
            .set_priority(&binding.thread, native)
            .map_err(|err| {
                warn!("thread {}: set priority {} failed: {}", object.id(), native, err);
                err
            })?;
        object.set_priority(priority);
        Ok(())
    }

    /// Suspends a running thread.
    ///
    /// `NotImplemented` unless the backend reports `SUSPEND`; a thread that
    /// is not Running is rejected with `InvalidParameter`.
    pub fn suspend<T>(&self, handle: &ThreadHandle<P, T, N>) -> Result<()> {
        self.check_owner(handle)?;
        if !self.core.info.supports(Capabilities::SUSPEND) {
            return Err(Error::NotImplemented);
        }
        let object = &handle.object;
        if !object.transition(State::Running, State::Suspended) {
            return Err(Error::InvalidParameter);
        }
        let binding = object.binding()?;
        if let Err(err) = self.core.platform.suspend(&binding.thread) {
            object.transition(State::Suspended, State::Running);
            warn!("thread {}: suspend failed: {}", object.id(), err);
            return Err(err);
        }
        Ok(())
    }

    /// Resumes a suspended thread.
    pub fn resume<T>(&self, handle: &ThreadHandle<P, T, N>) -> Result<()> {
        self.check_owner(handle)?;
        if !self.core.info.supports(Capabilities::SUSPEND) {
            return Err(Error::NotImplemented);
        }
        let object = &handle.object;
        if !object.transition(State::Suspended, State::Running) {
            return Err(Error::InvalidParameter);
        }
        let binding = object.binding()?;
        if let Err(err) = self.core.platform.resume(&binding.thread) {
            object.transition(State::Running, State::Suspended);
            warn!("thread {}: resume failed: {}", object.id(), err);
            return Err(err);
        }
        Ok(())
    }

    /// Puts the calling thread to sleep for `ms` milliseconds.
    pub fn sleep(&self, ms: u32) -> Result<()> {
        self.core.platform.sleep(ms)
    }

    /// Yields the calling thread's time slice.
    pub fn yield_now(&self) {
        self.core.platform.yield_now()
    }

    /// The managed thread this is called from, or `None` for threads not
    /// created through this manager.
    pub fn current(&self) -> Option<ThreadRef<P>> {
        let handle = self.core.platform.current();
        let found = self.core.registry.find_by_handle(handle);
        trace!("current: {:?} -> {:?}", handle, found.as_ref().map(|o| o.id()));
        found.map(ThreadRef::new)
    }

    /// Releases a terminated thread.
    ///
    /// A thread that has not reached Terminated is refused with
    /// `ThreadStillActive` and its handle is given back untouched.
    pub fn destroy<T>(
        &self,
        mut handle: ThreadHandle<P, T, N>,
    ) -> core::result::Result<(), DestroyError<ThreadHandle<P, T, N>>> {
        if let Err(error) = self.check_owner(&handle) {
            return Err(DestroyError { error, handle });
        }
        if handle.object.state() != State::Terminated {
            return Err(DestroyError {
                error: Error::ThreadStillActive,
                handle,
            });
        }
        if let Err(error) = self.core.registry.unregister(&handle.object) {
            return Err(DestroyError { error, handle });
        }
        if !handle.joined {
            if let Ok(binding) = handle.object.binding() {
                if let Err(err) = self.core.platform.detach(&binding.thread) {
                    warn!("thread {}: detach failed: {}", handle.object.id(), err);
                }
            }
        }
        handle.released = true;
        debug!("thread {} destroyed", handle.object.id());
        Ok(())
    }
}

impl<P: Platform, const N: usize> fmt::Debug for ThreadManager<P, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadManager")
            .field("info", &self.core.info)
            .field("registry", &self.core.registry)
            .finish()
    }
}

/// Publishes Terminated when the start routine ends, including by unwinding.
struct Finish<P: Platform, const N: usize> {
    object: Arc<ThreadObject<P>>,
    core: Arc<Core<P, N>>,
}

impl<P: Platform, const N: usize> Drop for Finish<P, N> {
    fn drop(&mut self) {
        self.object.publish_terminated();
        if self.object.is_detached() {
            self.core.release_slot(&self.object);
        }
    }
}

/// Owning handle to a thread created by [`ThreadManager::create`].
///
/// Dropping the handle instead of passing it to
/// [`ThreadManager::destroy`] detaches the thread; it keeps running and its
/// registry slot is freed when it finishes.
pub struct ThreadHandle<P: Platform, T, const N: usize = DEFAULT_MAX_THREADS> {
    object: Arc<ThreadObject<P>>,
    slot: Arc<ReturnSlot<T>>,
    core: Arc<Core<P, N>>,
    joined: bool,
    released: bool,
}

impl<P: Platform, T, const N: usize> ThreadHandle<P, T, N> {
    /// Unique identifier of the thread object.
    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        self.object.name()
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.object.state()
    }

    /// Last priority applied.
    pub fn priority(&self) -> Priority {
        self.object.priority()
    }

    /// Stack size the thread was created with.
    pub fn stack_size(&self) -> usize {
        self.object.stack_size()
    }

    /// Backend identity of the thread.
    pub fn handle(&self) -> Option<P::Handle> {
        self.object.handle()
    }

    /// Returns `true` once [`ThreadManager::join`] has been called.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// A non-owning view of the thread.
    pub fn thread_ref(&self) -> ThreadRef<P> {
        ThreadRef::new(Arc::clone(&self.object))
    }
}

impl<P: Platform, T, const N: usize> Drop for ThreadHandle<P, T, N> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("thread {} dropped without destroy, detaching", self.object.id());
        // Pairs with the SeqCst Terminated store in `Finish`: at least one
        // side observes the other and frees the slot.
        self.object.mark_detached();
        if !self.joined {
            if let Ok(binding) = self.object.binding() {
                if let Err(err) = self.core.platform.detach(&binding.thread) {
                    warn!("thread {}: detach failed: {}", self.object.id(), err);
                }
            }
        }
        if self.object.state_seq_cst() == State::Terminated {
            self.core.release_slot(&self.object);
        }
    }
}

impl<P: Platform, T, const N: usize> fmt::Debug for ThreadHandle<P, T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("object", &*self.object)
            .field("joined", &self.joined)
            .finish()
    }
}

/// A refused [`ThreadManager::destroy`]: the reason and the untouched handle.
pub struct DestroyError<H> {
    error: Error,
    handle: H,
}

impl<H> DestroyError<H> {
    /// Why the destroy was refused.
    pub fn error(&self) -> Error {
        self.error
    }

    /// Takes the handle back.
    pub fn into_handle(self) -> H {
        self.handle
    }
}

impl<H> fmt::Debug for DestroyError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<H> fmt::Display for DestroyError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "destroy refused: {}", self.error)
    }
}

impl<H> From<DestroyError<H>> for Error {
    fn from(err: DestroyError<H>) -> Self {
        err.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinytools_hal_mock::MockPlatform;

    #[test]
    fn test_new_requires_threads() {
        let platform = MockPlatform::new().with_capabilities(Capabilities::MUTEX);
        let manager = ThreadManager::<MockPlatform>::new(platform);
        assert!(matches!(manager, Err(Error::PlatformNotSupported)));
    }

    #[test]
    fn test_attributes_default_uses_backend_stack() {
        let manager: ThreadManager<MockPlatform> = ThreadManager::new(MockPlatform::new()).expect("manager");
        let attrs = manager.attributes_default();
        assert_eq!(attrs.stack_size, manager.info().thread.default_stack_size);
        assert_eq!(attrs.priority, Priority::Normal);
        assert_eq!(attrs.name, DEFAULT_THREAD_NAME);
    }

    #[test]
    fn test_resolve_rejects_bad_attributes() {
        let manager: ThreadManager<MockPlatform> = ThreadManager::new(MockPlatform::new()).expect("manager");
        let limits = manager.info().thread;
        let too_small = Attributes::default().with_stack_size(limits.min_stack_size - 1);
        assert_eq!(manager.resolve(&too_small), Err(Error::InvalidParameter));
        let too_large = Attributes::default().with_stack_size(limits.max_stack_size + 1);
        assert_eq!(manager.resolve(&too_large), Err(Error::InvalidParameter));
        let bad_name = Attributes::default().with_name("a\0b");
        assert_eq!(manager.resolve(&bad_name), Err(Error::InvalidParameter));
        let unnamed = manager.resolve(&Attributes::default().with_name("")).expect("resolve");
        assert_eq!(unnamed.name, DEFAULT_THREAD_NAME);
        assert_eq!(unnamed.stack_size, limits.default_stack_size);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let a: ThreadManager<MockPlatform> = ThreadManager::new(MockPlatform::new()).expect("manager a");
        let b: ThreadManager<MockPlatform> = ThreadManager::new(MockPlatform::new()).expect("manager b");
        let mut handle = a.create(&Attributes::default(), || 1u8).expect("create");
        assert_eq!(b.join(&mut handle), Err(Error::InvalidParameter));
        assert_eq!(a.join(&mut handle), Ok(1));
        let refused = b.destroy(handle).expect_err("foreign destroy");
        assert_eq!(refused.error(), Error::InvalidParameter);
        a.destroy(refused.into_handle()).expect("destroy");
    }

    #[test]
    fn test_registry_round_trip_through_create() {
        let manager: ThreadManager<MockPlatform> = ThreadManager::new(MockPlatform::new()).expect("manager");
        let mut handle = manager.create(&Attributes::default(), || ()).expect("create");
        let backend = handle.handle().expect("bound");
        let found = manager.registry().find_by_handle(backend).expect("registered");
        assert_eq!(found.id(), handle.id());
        drop(found);
        manager.join(&mut handle).expect("join");
        manager.destroy(handle).expect("destroy");
        assert!(manager.registry().find_by_handle(backend).is_none());
        assert!(manager.registry().is_empty());
    }
}
