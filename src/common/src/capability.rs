//! Platform capability flags and the static platform description a backend
//! reports once at startup.

use bitflags::bitflags;

bitflags! {
    /// Features a backend provides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Capabilities: u32 {
        const THREADS     = 1 << 0;
        const MUTEX       = 1 << 1;
        const SEMAPHORE   = 1 << 2;
        const TLS         = 1 << 3; // Thread local storage
        const ATOMIC      = 1 << 4;
        const IRQ         = 1 << 5;
        const TIMERS      = 1 << 6;
        const DMA         = 1 << 7;
        const SUSPEND     = 1 << 8; // Safe preemptive suspension
        const NATIVE_JOIN = 1 << 9; // Blocking join
    }
}

/// Kind of platform a backend runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlatformKind {
    #[default]
    Unknown,
    Linux,
    Windows,
    MacOs,
    FreeRtos,
    Arduino,
    BareMetal,
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Arch {
    #[default]
    Unknown,
    X86,
    X64,
    Arm,
    Arm64,
    Avr,
    RiscV,
}

impl Arch {
    /// Architecture this crate was compiled for.
    pub const fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Arch::X64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else if cfg!(target_arch = "arm") {
            Arch::Arm
        } else if cfg!(target_arch = "avr") {
            Arch::Avr
        } else if cfg!(any(target_arch = "riscv32", target_arch = "riscv64")) {
            Arch::RiscV
        } else {
            Arch::Unknown
        }
    }
}

/// Thread related limits of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreadLimits {
    /// Smallest stack a thread may request, 0 if unknown.
    pub min_stack_size: usize,
    /// Largest stack a thread may request, 0 if unbounded.
    pub max_stack_size: usize,
    /// Stack size used when a thread requests 0.
    pub default_stack_size: usize,
    /// Lowest native priority value.
    pub min_priority: i32,
    /// Highest native priority value.
    pub max_priority: i32,
}

/// Static description of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlatformInfo {
    /// The platform kind.
    pub kind: PlatformKind,
    /// The CPU architecture.
    pub arch: Arch,
    /// Supported features.
    pub capabilities: Capabilities,
    /// Number of CPU cores, 0 if unknown.
    pub core_count: u16,
    /// Thread limits.
    pub thread: ThreadLimits,
}

impl PlatformInfo {
    /// Returns `true` if every flag in `caps` is supported.
    pub fn supports(&self, caps: Capabilities) -> bool {
        self.capabilities.contains(caps)
    }
}
