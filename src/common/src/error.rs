//! System-wide error kinds for TinyTools.

use core::fmt;

/// Result alias used throughout the workspace.
pub type Result<T> = core::result::Result<T, Error>;

/// Error kinds shared by the atomic, mutex and thread layers.
///
/// Backend failures are mapped onto the closest kind; the backend's own
/// error code is not preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// A backend handed out a null handle or pointer
    NullReference,
    /// Invalid parameter value
    InvalidParameter,
    /// Object not initialized, or already destroyed
    NotInitialized,
    /// Object is already initialized
    AlreadyInitialized,
    /// Resource is busy (lock held, trylock contention)
    Busy,
    /// Buffer is full
    BufferFull,
    /// Buffer is empty
    BufferEmpty,
    /// Allocation failed
    OutOfMemory,
    /// Operation timed out
    Timeout,
    /// Resource not found, or registry table full
    NotFound,
    /// Backend failed to start a thread
    ThreadCreateFailed,
    /// Backend failed to join a thread, or it was already joined
    ThreadJoinFailed,
    /// Thread has not terminated yet
    ThreadStillActive,
    /// Platform lacks a required capability
    PlatformNotSupported,
    /// Operation not available on this backend
    NotImplemented,
    /// Unknown error
    Unknown,
}

impl Error {
    /// Short human readable description.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Error::NullReference => "null reference",
            Error::InvalidParameter => "invalid parameter",
            Error::NotInitialized => "not initialized",
            Error::AlreadyInitialized => "already initialized",
            Error::Busy => "resource busy",
            Error::BufferFull => "buffer full",
            Error::BufferEmpty => "buffer empty",
            Error::OutOfMemory => "out of memory",
            Error::Timeout => "operation timed out",
            Error::NotFound => "not found",
            Error::ThreadCreateFailed => "failed to create thread",
            Error::ThreadJoinFailed => "failed to join thread",
            Error::ThreadStillActive => "thread still active",
            Error::PlatformNotSupported => "platform not supported",
            Error::NotImplemented => "not implemented on this platform",
            Error::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(Error::Busy.to_string(), "resource busy");
        assert_eq!(Error::ThreadStillActive.to_string(), Error::ThreadStillActive.as_str());
    }

    #[test]
    fn test_question_mark_propagates() {
        fn inner() -> Result<u32> {
            Err(Error::NotFound)
        }
        fn outer() -> Result<u32> {
            let v = inner()?;
            Ok(v + 1)
        }
        assert_eq!(outer(), Err(Error::NotFound));
    }
}
