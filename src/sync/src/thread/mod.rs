//! Managed threads.
//!
//! A thread is created through a [`ThreadManager`], which binds a
//! [`ThreadObject`] to a backend thread and records it in the manager's
//! [`Registry`]. The caller owns the returned [`ThreadHandle`] until it is
//! passed to [`ThreadManager::destroy`].
//!
//! # Life cycle
//!
//! ```text
//!  create ──► Created ──► Running ──► Terminated ──► destroy
//!                          │   ▲
//!                 suspend  ▼   │ resume      (backends with SUSPEND only)
//!                         Suspended
//! ```
//!
//! The state lives in an atomic inside the object: the backend thread
//! publishes Running and Terminated with Release ordering and readers load
//! it with Acquire, so a reader that sees Terminated also sees the return
//! value written before it.

mod manager;
pub(crate) mod object;
mod registry;

pub use manager::{DestroyError, ThreadHandle, ThreadManager};
pub use object::{ObjectId, ThreadObject, ThreadRef};
pub use registry::Registry;

use alloc::string::String;

use tinytools_common::ThreadLimits;

use crate::config::DEFAULT_THREAD_NAME;

/// Logical thread priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Backend minimum.
    Low = 0,
    /// One third of the native range.
    #[default]
    Normal = 1,
    /// Two thirds of the native range.
    High = 2,
    /// Backend maximum.
    Realtime = 3,
}

impl Priority {
    pub(crate) fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Priority::Low,
            2 => Priority::High,
            3 => Priority::Realtime,
            _ => Priority::Normal,
        }
    }

    /// Maps this level onto a backend's native priority range.
    ///
    /// Low is the minimum, Realtime the maximum, Normal and High sit at one
    /// and two thirds of the span.
    pub fn to_native(self, limits: &ThreadLimits) -> i32 {
        let min = i64::from(limits.min_priority);
        let span = i64::from(limits.max_priority) - min;
        let native = match self {
            Priority::Low => min,
            Priority::Normal => min + span / 3,
            Priority::High => min + span * 2 / 3,
            Priority::Realtime => min + span,
        };
        native as i32
    }
}

/// Thread life-cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Started by the backend, user function not yet entered.
    Created = 0,
    /// Inside the user function.
    Running = 1,
    /// Parked by [`ThreadManager::suspend`].
    Suspended = 2,
    /// The user function returned or unwound. Terminal.
    Terminated = 3,
}

impl State {
    pub(crate) fn from_raw(raw: i32) -> Self {
        match raw {
            0 => State::Created,
            1 => State::Running,
            2 => State::Suspended,
            3 => State::Terminated,
            other => {
                debug_assert!(false, "corrupt thread state {}", other);
                State::Terminated
            }
        }
    }
}

/// Thread creation attributes. Copied into the thread object at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    /// Scheduling priority.
    pub priority: Priority,
    /// Stack size in bytes, 0 for the backend default.
    pub stack_size: usize,
    /// Display name.
    pub name: String,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            stack_size: 0,
            name: String::from(DEFAULT_THREAD_NAME),
        }
    }
}

impl Attributes {
    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the stack size.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(min: i32, max: i32) -> ThreadLimits {
        ThreadLimits {
            min_priority: min,
            max_priority: max,
            ..ThreadLimits::default()
        }
    }

    #[test]
    fn test_priority_mapping_posix_range() {
        let l = limits(1, 99);
        assert_eq!(Priority::Low.to_native(&l), 1);
        assert_eq!(Priority::Normal.to_native(&l), 33);
        assert_eq!(Priority::High.to_native(&l), 66);
        assert_eq!(Priority::Realtime.to_native(&l), 99);
    }

    #[test]
    fn test_priority_mapping_flat_range() {
        let l = limits(0, 0);
        for p in [Priority::Low, Priority::Normal, Priority::High, Priority::Realtime] {
            assert_eq!(p.to_native(&l), 0);
        }
    }

    #[test]
    fn test_priority_mapping_rtos_range() {
        let l = limits(0, 4);
        assert_eq!(Priority::Low.to_native(&l), 0);
        assert_eq!(Priority::Normal.to_native(&l), 1);
        assert_eq!(Priority::High.to_native(&l), 2);
        assert_eq!(Priority::Realtime.to_native(&l), 4);
    }

    #[test]
    fn test_attributes_default() {
        let attrs = Attributes::default();
        assert_eq!(attrs.priority, Priority::Normal);
        assert_eq!(attrs.stack_size, 0);
        assert_eq!(attrs.name, DEFAULT_THREAD_NAME);
    }

    #[test]
    fn test_state_raw_round_trip() {
        for s in [State::Created, State::Running, State::Suspended, State::Terminated] {
            assert_eq!(State::from_raw(s as i32), s);
        }
        for p in [Priority::Low, Priority::Normal, Priority::High, Priority::Realtime] {
            assert_eq!(Priority::from_raw(p as i32), p);
        }
    }
}
