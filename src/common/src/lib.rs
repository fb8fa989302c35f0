//! Types shared by every TinyTools crate.
//!
//! - [`error`]: the error-kind enumeration returned by all operations
//! - [`capability`]: platform capability flags and platform description

#![no_std]

pub mod capability;
pub mod error;

pub use capability::{Arch, Capabilities, PlatformInfo, PlatformKind, ThreadLimits};
pub use error::{Error, Result};
