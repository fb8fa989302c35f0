//! Backends shipped with the core.
//!
//! Targets without `std` bring their own [`Platform`](crate::hal::Platform)
//! implementation.

#[cfg(feature = "std")]
mod hosted;

#[cfg(feature = "std")]
pub use self::hosted::{StdPlatform, StdRawMutex, StdThread};
