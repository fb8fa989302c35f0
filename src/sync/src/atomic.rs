//! 32-bit atomic integer with explicit memory ordering.
//!
//! [`AtomicInt`] maps each operation one-to-one onto the target's native
//! atomic instruction. The ordering is passed per call as a [`MemoryOrder`],
//! like the C11 API it mirrors, instead of being fixed per type.
//!
//! # Ordering rules
//!
//! Acquire only makes sense on operations that read and Release only on
//! operations that write. Rust's atomics panic on mismatched orderings, so
//! a mismatch is strengthened to the nearest valid ordering instead:
//!
//! | operation | requested           | applied      |
//! |-----------|---------------------|--------------|
//! | load      | Release / AcqRel    | Acquire      |
//! | store     | Acquire / AcqRel    | Release      |
//!
//! Read-modify-write operations accept every ordering.

use core::sync::atomic::{self, AtomicI32, Ordering};

/// Memory ordering constraint for an atomic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOrder {
    /// No ordering constraints, only atomicity.
    Relaxed,
    /// Later reads and writes of this thread stay after the operation.
    Acquire,
    /// Earlier reads and writes of this thread stay before the operation.
    Release,
    /// Acquire and Release combined.
    AcqRel,
    /// A single total order across all SeqCst operations.
    SeqCst,
}

impl MemoryOrder {
    pub(crate) fn for_load(self) -> Ordering {
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Acquire | MemoryOrder::Release | MemoryOrder::AcqRel => Ordering::Acquire,
            MemoryOrder::SeqCst => Ordering::SeqCst,
        }
    }

    pub(crate) fn for_store(self) -> Ordering {
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Acquire | MemoryOrder::Release | MemoryOrder::AcqRel => Ordering::Release,
            MemoryOrder::SeqCst => Ordering::SeqCst,
        }
    }

    pub(crate) fn for_rmw(self) -> Ordering {
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Acquire => Ordering::Acquire,
            MemoryOrder::Release => Ordering::Release,
            MemoryOrder::AcqRel => Ordering::AcqRel,
            MemoryOrder::SeqCst => Ordering::SeqCst,
        }
    }

    // The failure half of a CAS only reads.
    pub(crate) fn for_cas_failure(self) -> Ordering {
        match self {
            MemoryOrder::Relaxed | MemoryOrder::Release => Ordering::Relaxed,
            MemoryOrder::Acquire | MemoryOrder::AcqRel => Ordering::Acquire,
            MemoryOrder::SeqCst => Ordering::SeqCst,
        }
    }
}

/// A 32-bit signed integer updated only through atomic operations.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicInt {
    value: AtomicI32,
}

impl AtomicInt {
    /// Creates a new atomic integer holding `initial`.
    pub const fn new(initial: i32) -> Self {
        Self {
            value: AtomicI32::new(initial),
        }
    }

    /// Loads the current value.
    #[inline]
    pub fn load(&self, order: MemoryOrder) -> i32 {
        self.value.load(order.for_load())
    }

    /// Stores `value`.
    #[inline]
    pub fn store(&self, value: i32, order: MemoryOrder) {
        self.value.store(value, order.for_store())
    }

    /// Adds `delta` (wrapping) and returns the previous value.
    #[inline]
    pub fn add(&self, delta: i32, order: MemoryOrder) -> i32 {
        self.value.fetch_add(delta, order.for_rmw())
    }

    /// Subtracts `delta` (wrapping) and returns the previous value.
    #[inline]
    pub fn sub(&self, delta: i32, order: MemoryOrder) -> i32 {
        self.value.fetch_sub(delta, order.for_rmw())
    }

    /// Strong compare-and-exchange.
    ///
    /// Stores `desired` if the current value equals `*expected` and returns
    /// `true`. Otherwise leaves the value untouched, writes the value it
    /// found into `*expected` and returns `false`. Never fails spuriously.
    ///
    /// ```
    /// use tinytools_sync::atomic::{AtomicInt, MemoryOrder};
    ///
    /// let counter = AtomicInt::new(0);
    /// let mut current = counter.load(MemoryOrder::Relaxed);
    /// loop {
    ///     let next = current * 2 + 1;
    ///     if counter.compare_exchange(&mut current, next, MemoryOrder::AcqRel) {
    ///         break;
    ///     }
    /// }
    /// assert_eq!(counter.load(MemoryOrder::Relaxed), 1);
    /// ```
    #[inline]
    pub fn compare_exchange(&self, expected: &mut i32, desired: i32, order: MemoryOrder) -> bool {
        match self.value.compare_exchange(
            *expected,
            desired,
            order.for_rmw(),
            order.for_cas_failure(),
        ) {
            Ok(_) => true,
            Err(actual) => {
                *expected = actual;
                false
            }
        }
    }

    /// Consumes the atomic and returns the contained value.
    pub fn into_inner(self) -> i32 {
        self.value.into_inner()
    }
}

/// Issues a standalone memory fence.
///
/// A relaxed fence orders nothing and compiles to no instruction.
#[inline]
pub fn thread_fence(order: MemoryOrder) {
    match order {
        MemoryOrder::Relaxed => {}
        MemoryOrder::Acquire => atomic::fence(Ordering::Acquire),
        MemoryOrder::Release => atomic::fence(Ordering::Release),
        MemoryOrder::AcqRel => atomic::fence(Ordering::AcqRel),
        MemoryOrder::SeqCst => atomic::fence(Ordering::SeqCst),
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
    fn test_init_and_load() {
        let atomic = AtomicInt::new(42);
        assert_eq!(atomic.load(MemoryOrder::Relaxed), 42);
        assert_eq!(AtomicInt::default().load(MemoryOrder::SeqCst), 0);
    }

    #[test]
    fn test_store_load() {
        let atomic = AtomicInt::new(0);
        atomic.store(123, MemoryOrder::Relaxed);
        assert_eq!(atomic.load(MemoryOrder::Relaxed), 123);
    }

    #[test]
    fn test_add_returns_previous() {
        let atomic = AtomicInt::new(100);
        assert_eq!(atomic.add(50, MemoryOrder::Relaxed), 100);
        assert_eq!(atomic.load(MemoryOrder::Relaxed), 150);
    }

    #[test]
    fn test_sub_returns_previous() {
        let atomic = AtomicInt::new(100);
        assert_eq!(atomic.sub(70, MemoryOrder::Relaxed), 100);
        assert_eq!(atomic.load(MemoryOrder::Relaxed), 30);
    }

    #[test]
    fn test_add_wraps() {
        let atomic = AtomicInt::new(i32::MAX);
        atomic.add(1, MemoryOrder::SeqCst);
        assert_eq!(atomic.load(MemoryOrder::SeqCst), i32::MIN);
    }

    #[test]
    fn test_compare_exchange_success() {
        let atomic = AtomicInt::new(100);
        let mut expected = 100;
        assert!(atomic.compare_exchange(&mut expected, 200, MemoryOrder::Relaxed));
        assert_eq!(atomic.load(MemoryOrder::Relaxed), 200);
        assert_eq!(expected, 100);
    }

    #[test]
    fn test_compare_exchange_failure_reports_actual() {
        let atomic = AtomicInt::new(100);
        let mut expected = 999;
        assert!(!atomic.compare_exchange(&mut expected, 200, MemoryOrder::Relaxed));
        assert_eq!(atomic.load(MemoryOrder::Relaxed), 100);
        assert_eq!(expected, 100);
    }

    #[test]
    fn test_mismatched_orders_do_not_panic() {
        let atomic = AtomicInt::new(1);
        atomic.store(2, MemoryOrder::Acquire);
        atomic.store(3, MemoryOrder::AcqRel);
        assert_eq!(atomic.load(MemoryOrder::Release), 3);
        assert_eq!(atomic.load(MemoryOrder::AcqRel), 3);
        let mut expected = 3;
        assert!(atomic.compare_exchange(&mut expected, 4, MemoryOrder::Release));
        thread_fence(MemoryOrder::Relaxed);
        thread_fence(MemoryOrder::SeqCst);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        const THREADS: usize = 4;
        const ITERATIONS: i32 = 1000;

        let counter = Arc::new(AtomicInt::new(0));
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..ITERATIONS {
                        counter.add(1, MemoryOrder::Release);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        thread_fence(MemoryOrder::Acquire);
        assert_eq!(counter.load(MemoryOrder::Relaxed), THREADS as i32 * ITERATIONS);
    }

    #[test]
    fn test_concurrent_cas_loop() {
        let counter = Arc::new(AtomicInt::new(0));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let mut current = counter.load(MemoryOrder::Relaxed);
                        loop {
                            let next = current + 2;
                            if counter.compare_exchange(&mut current, next, MemoryOrder::AcqRel) {
                                break;
                            }
                        }
                        counter.sub(1, MemoryOrder::AcqRel);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        assert_eq!(counter.load(MemoryOrder::SeqCst), 2000);
    }
}
