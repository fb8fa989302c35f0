//! Loom models of the synchronization protocols in this crate.
//!
//! Each model restates one protocol with loom's atomics so every
//! interleaving allowed by the memory model is explored. The models take
//! their orderings from the constants the real code uses, converted the same
//! way [`AtomicInt`](crate::AtomicInt) converts them:
//!
//! - the spinlock claim/release used by [`SpinLock`](crate::SpinLock)
//! - publishing a thread's return value before its Terminated state
//! - the detach handshake between a dropped handle and a finishing thread
//!
//! ```bash
//! cargo test -p tinytools-sync --features loom -- --test-threads=1 loom
//! ```

#[cfg(all(test, feature = "loom"))]
mod tests {
    use loom::cell::UnsafeCell;
    use loom::sync::atomic::AtomicI32;
    use loom::sync::Arc;
    use loom::thread;

    use crate::mutex::spinlock::{CLAIM, LOCKED, RELEASE, UNLOCKED, WAIT};
    use crate::thread::object::{HANDSHAKE, OBSERVE, PUBLISH};
    use crate::thread::State;

    struct LoomSpinLock {
        flag: AtomicI32,
        data: UnsafeCell<i32>,
    }

    // SAFETY: `data` is only accessed between `lock` and `unlock`.
    unsafe impl Sync for LoomSpinLock {}

    impl LoomSpinLock {
        fn new() -> Self {
            Self {
                flag: AtomicI32::new(UNLOCKED),
                data: UnsafeCell::new(0),
            }
        }

        fn lock(&self) {
            loop {
                if self
                    .flag
                    .compare_exchange(UNLOCKED, LOCKED, CLAIM.for_rmw(), CLAIM.for_cas_failure())
                    .is_ok()
                {
                    return;
                }
                while self.flag.load(WAIT.for_load()) == LOCKED {
                    thread::yield_now();
                }
            }
        }

        fn unlock(&self) {
            let released = self
                .flag
                .compare_exchange(LOCKED, UNLOCKED, RELEASE.for_rmw(), RELEASE.for_cas_failure());
            assert!(released.is_ok());
        }
    }

    /// Two lockers never lose an increment of the protected counter.
    #[test]
    fn loom_spinlock_mutual_exclusion() {
        loom::model(|| {
            let lock = Arc::new(LoomSpinLock::new());
            let other = Arc::clone(&lock);

            let t = thread::spawn(move || {
                other.lock();
                other.data.with_mut(|p| unsafe { *p += 1 });
                other.unlock();
            });

            lock.lock();
            lock.data.with_mut(|p| unsafe { *p += 1 });
            lock.unlock();

            t.join().expect("locker");
            let total = lock.data.with(|p| unsafe { *p });
            assert_eq!(total, 2);
        });
    }

    const RUNNING: i32 = State::Running as i32;
    const TERMINATED: i32 = State::Terminated as i32;

    struct LoomThread {
        state: AtomicI32,
        value: UnsafeCell<Option<i32>>,
        detached: AtomicI32,
        registered: AtomicI32,
    }

    // SAFETY: `value` is written before the publishing store of TERMINATED
    // and read only after an observing load sees it.
    unsafe impl Sync for LoomThread {}

    impl LoomThread {
        fn new() -> Self {
            Self {
                state: AtomicI32::new(RUNNING),
                value: UnsafeCell::new(None),
                detached: AtomicI32::new(0),
                registered: AtomicI32::new(1),
            }
        }

        fn unregister(&self) {
            self.registered.store(0, HANDSHAKE.for_store());
        }
    }

    /// A reader that sees Terminated also sees the return value.
    #[test]
    fn loom_return_value_visible_after_terminated() {
        loom::model(|| {
            let object = Arc::new(LoomThread::new());
            let worker = Arc::clone(&object);

            let t = thread::spawn(move || {
                worker.value.with_mut(|p| unsafe { *p = Some(42) });
                worker.state.store(TERMINATED, PUBLISH.for_store());
            });

            if object.state.load(OBSERVE.for_load()) == TERMINATED {
                let value = object.value.with(|p| unsafe { *p });
                assert_eq!(value, Some(42));
            }
            t.join().expect("worker");
        });
    }

    /// Whatever the interleaving of drop and finish, the slot is freed.
    #[test]
    fn loom_detach_handshake_frees_slot() {
        loom::model(|| {
            let object = Arc::new(LoomThread::new());
            let worker = Arc::clone(&object);

            let t = thread::spawn(move || {
                worker.state.store(TERMINATED, HANDSHAKE.for_store());
                if worker.detached.load(HANDSHAKE.for_load()) != 0 {
                    worker.unregister();
                }
            });

            object.detached.store(1, HANDSHAKE.for_store());
            if object.state.load(HANDSHAKE.for_load()) == TERMINATED {
                object.unregister();
            }

            t.join().expect("worker");
            assert_eq!(object.registered.load(HANDSHAKE.for_load()), 0);
        });
    }
}
