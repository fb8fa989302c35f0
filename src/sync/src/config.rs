//! Build-time configuration constants.

/// Default capacity of the thread registry.
pub const DEFAULT_MAX_THREADS: usize = 32;

/// Name given to threads created without one.
pub const DEFAULT_THREAD_NAME: &str = "tt_thread";

/// Sleep between state polls when joining on a backend without native join.
pub const JOIN_POLL_INTERVAL_MS: u32 = 1;
