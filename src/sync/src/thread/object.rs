//! The logical thread object and its return-value slot.

use alloc::string::String;
use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::fmt;

use spin::Once;
use tinytools_hal::{Error, Platform, Result};

use super::{Attributes, Priority, State};
use crate::atomic::{AtomicInt, MemoryOrder};

/// Ordering of state stores that publish earlier writes.
pub(crate) const PUBLISH: MemoryOrder = MemoryOrder::Release;
/// Ordering of state loads by observers.
pub(crate) const OBSERVE: MemoryOrder = MemoryOrder::Acquire;
/// Ordering of both sides of the detach handshake.
pub(crate) const HANDSHAKE: MemoryOrder = MemoryOrder::SeqCst;

/// Process-unique identifier of a thread object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    fn next() -> Self {
        static NEXT_ID: AtomicInt = AtomicInt::new(1);
        ObjectId(NEXT_ID.add(1, MemoryOrder::Relaxed) as u32)
    }

    /// Raw numeric value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Backend thread bound to an object once spawn succeeded.
pub(crate) struct Binding<P: Platform> {
    pub(crate) thread: P::Thread,
    pub(crate) handle: P::Handle,
}

const GATE_CLOSED: i32 = 0;
const GATE_OPEN: i32 = 1;

/// A logical thread.
///
/// Shared between the owning [`ThreadHandle`](super::ThreadHandle), the
/// backend start routine and, as a weak back-reference, the registry.
/// Everything the start routine and other threads touch concurrently is an
/// atomic or written once before being published.
pub struct ThreadObject<P: Platform> {
    id: ObjectId,
    name: String,
    stack_size: usize,
    priority: AtomicInt,
    state: AtomicInt,
    /// Opened by the creator once the object is bound and registered.
    gate: AtomicInt,
    /// Set when the owner dropped its handle without destroying it.
    detached: AtomicInt,
    binding: Once<Binding<P>>,
}

impl<P: Platform> ThreadObject<P> {
    pub(crate) fn new(attrs: &Attributes) -> Self {
        Self {
            id: ObjectId::next(),
            name: attrs.name.clone(),
            stack_size: attrs.stack_size,
            priority: AtomicInt::new(attrs.priority as i32),
            state: AtomicInt::new(State::Created as i32),
            gate: AtomicInt::new(GATE_CLOSED),
            detached: AtomicInt::new(0),
            binding: Once::new(),
        }
    }

    /// Unique identifier.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stack size the thread was created with.
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Last priority applied successfully.
    pub fn priority(&self) -> Priority {
        Priority::from_raw(self.priority.load(MemoryOrder::Acquire))
    }

    pub(crate) fn set_priority(&self, priority: Priority) {
        self.priority.store(priority as i32, MemoryOrder::Release);
    }

    /// Current state. Never blocks.
    pub fn state(&self) -> State {
        State::from_raw(self.state.load(OBSERVE))
    }

    pub(crate) fn state_seq_cst(&self) -> State {
        State::from_raw(self.state.load(HANDSHAKE))
    }

    pub(crate) fn publish(&self, state: State) {
        self.state.store(state as i32, PUBLISH);
    }

    pub(crate) fn publish_terminated(&self) {
        // SeqCst pairs with `mark_detached` in the handle's drop.
        self.state.store(State::Terminated as i32, HANDSHAKE);
    }

    pub(crate) fn transition(&self, from: State, to: State) -> bool {
        let mut expected = from as i32;
        self.state.compare_exchange(&mut expected, to as i32, MemoryOrder::AcqRel)
    }

    /// Backend identity of the thread, once spawned.
    pub fn handle(&self) -> Option<P::Handle> {
        self.binding.get().map(|b| b.handle)
    }

    pub(crate) fn bind(&self, thread: P::Thread, handle: P::Handle) {
        self.binding.call_once(|| Binding { thread, handle });
    }

    pub(crate) fn binding(&self) -> Result<&Binding<P>> {
        self.binding.get().ok_or(Error::NotInitialized)
    }

    pub(crate) fn open_gate(&self) {
        self.gate.store(GATE_OPEN, MemoryOrder::Release);
    }

    pub(crate) fn wait_for_gate(&self, platform: &P) {
        while self.gate.load(MemoryOrder::Acquire) != GATE_OPEN {
            platform.yield_now();
        }
    }

    pub(crate) fn mark_detached(&self) {
        self.detached.store(1, HANDSHAKE);
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(HANDSHAKE) != 0
    }
}

impl<P: Platform> fmt::Debug for ThreadObject<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadObject")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("priority", &self.priority())
            .field("handle", &self.handle())
            .finish()
    }
}

/// Non-owning view of a managed thread, as returned by
/// [`ThreadManager::current`](super::ThreadManager::current).
pub struct ThreadRef<P: Platform> {
    object: Arc<ThreadObject<P>>,
}

impl<P: Platform> ThreadRef<P> {
    pub(crate) fn new(object: Arc<ThreadObject<P>>) -> Self {
        Self { object }
    }

    /// Unique identifier.
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

    /// Current priority.
    pub fn priority(&self) -> Priority {
        self.object.priority()
    }

    /// Backend identity.
    pub fn handle(&self) -> Option<P::Handle> {
        self.object.handle()
    }
}

impl<P: Platform> Clone for ThreadRef<P> {
    fn clone(&self) -> Self {
        Self {
            object: Arc::clone(&self.object),
        }
    }
}

impl<P: Platform> PartialEq for ThreadRef<P> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl<P: Platform> Eq for ThreadRef<P> {}

impl<P: Platform> fmt::Debug for ThreadRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.object, f)
    }
}

/// Slot the start routine writes the user function's return value into.
///
/// Written exactly once by the backend thread before it publishes
/// Terminated, and read only by the owning handle after it has observed
/// Terminated with Acquire ordering.
pub(crate) struct ReturnSlot<T> {
    value: UnsafeCell<Option<T>>,
}

// SAFETY: access is serialized by the Terminated publication described
// above: one write strictly happens-before every read, and reads require
// exclusive access to the owning handle.
unsafe impl<T: Send> Sync for ReturnSlot<T> {}

impl<T> ReturnSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: UnsafeCell::new(None),
        }
    }

    /// # Safety
    ///
    /// Must be called at most once, by the start routine, before the state
    /// is published as Terminated.
    pub(crate) unsafe fn put(&self, value: T) {
        *self.value.get() = Some(value);
    }

    /// # Safety
    ///
    /// The caller must have observed Terminated with Acquire ordering and
    /// hold the only handle to the thread mutably.
    pub(crate) unsafe fn take(&self) -> Option<T> {
        (*self.value.get()).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinytools_hal_mock::MockPlatform;

    #[test]
    fn test_new_object_is_created_and_unbound() {
        let attrs = Attributes::default().with_name("worker").with_priority(Priority::High);
        let object: ThreadObject<MockPlatform> = ThreadObject::new(&attrs);
        assert_eq!(object.state(), State::Created);
        assert_eq!(object.priority(), Priority::High);
        assert_eq!(object.name(), "worker");
        assert!(object.handle().is_none());
        assert_eq!(object.binding().err(), Some(Error::NotInitialized));
    }

    #[test]
    fn test_object_ids_are_unique() {
        let attrs = Attributes::default();
        let a: ThreadObject<MockPlatform> = ThreadObject::new(&attrs);
        let b: ThreadObject<MockPlatform> = ThreadObject::new(&attrs);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_transition_only_from_expected_state() {
        let object: ThreadObject<MockPlatform> = ThreadObject::new(&Attributes::default());
        assert!(!object.transition(State::Running, State::Suspended));
        object.publish(State::Running);
        assert!(object.transition(State::Running, State::Suspended));
        assert_eq!(object.state(), State::Suspended);
        object.publish_terminated();
        assert!(!object.transition(State::Suspended, State::Running));
        assert_eq!(object.state(), State::Terminated);
    }

    #[test]
    fn test_return_slot_take_once() {
        let slot = ReturnSlot::new();
        unsafe {
            slot.put(42u32);
            assert_eq!(slot.take(), Some(42));
            assert_eq!(slot.take(), None);
        }
    }
}
