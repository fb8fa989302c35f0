//! TinyTools Sync
//!
//! Portable concurrency primitives over pluggable platform backends.
//!
//! # Architecture
//!
//! - `atomic`: 32-bit atomic integer with per-call memory ordering
//! - `mutex`: lifecycle-checked mutex over a spinlock or a native mutex
//! - `thread`: thread objects, the registry and the lifecycle manager
//! - `platform`: backends shipped with the crate (`StdPlatform` with `std`)
//!
//! Backends implement the [`hal::Platform`] contract; the core itself never
//! issues system calls.
//!
//! # Example
//!
//! ```
//! use tinytools_sync::platform::StdPlatform;
//! use tinytools_sync::thread::{Attributes, ThreadManager};
//!
//! let manager: ThreadManager<StdPlatform> = ThreadManager::new(StdPlatform::new()).unwrap();
//! let mut handle = manager.create(&Attributes::default(), || 6 * 7).unwrap();
//! assert_eq!(manager.join(&mut handle).unwrap(), 42);
//! manager.destroy(handle).unwrap();
//! ```
//!
//! # Safety
//!
//! Unsafe code is limited to the return-value slot and the registry table,
//! both documented with the ordering that makes them sound, and to the
//! `libc` scheduling calls of the hosted backend.

#![no_std]
#![warn(missing_docs)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod atomic;
pub mod config;
pub mod mutex;
pub mod platform;
pub mod thread;

#[cfg(any(test, feature = "loom"))]
mod loom_tests;

pub use tinytools_hal as hal;

pub use atomic::{thread_fence, AtomicInt, MemoryOrder};
pub use mutex::{Mutex, SpinLock};
pub use thread::{Attributes, Priority, State, ThreadHandle, ThreadManager, ThreadRef};
pub use tinytools_common::{Capabilities, Error, PlatformInfo, Result};
