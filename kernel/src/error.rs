//! Kernel error taxonomy.
//!
//! Two layers, matching the rest of the codebase: a rich [`KernelError`] used
//! between Rust modules, and a thin [`Errno`] at the syscall boundary where
//! the ABI (`x0`) is a bare negative integer.

use core::fmt;

/// Internal, `Display`-able error type returned by kernel subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Page allocator or thread table exhausted.
    OutOfMemory,
    /// Non-waiting caller hit lock contention or transient exhaustion.
    WouldBlock,
    /// Address is misaligned or outside a valid window.
    InvalidAddress { addr: u64 },
    /// Virtual address has no mapping.
    UnmappedMemory { addr: u64 },
    /// Argument fails a precondition (bad flag combination, zero-sized
    /// range, etc).
    InvalidArgument { what: &'static str },
    /// Scheduler thread table has no free slot.
    ThreadTableFull,
    /// `tid` does not name a live, joinable thread.
    InvalidThread,
    /// File descriptor is not one of the supported tty fds.
    BadFileDescriptor,
    /// Device reported a framing/parity/overrun error.
    Io,
    /// Syscall number not recognized.
    NotImplemented,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory => write!(f, "out of memory"),
            KernelError::WouldBlock => write!(f, "operation would block"),
            KernelError::InvalidAddress { addr } => write!(f, "invalid address {addr:#x}"),
            KernelError::UnmappedMemory { addr } => write!(f, "unmapped address {addr:#x}"),
            KernelError::InvalidArgument { what } => write!(f, "invalid argument: {what}"),
            KernelError::ThreadTableFull => write!(f, "thread table full"),
            KernelError::InvalidThread => write!(f, "invalid or non-joinable thread id"),
            KernelError::BadFileDescriptor => write!(f, "bad file descriptor"),
            KernelError::Io => write!(f, "i/o error"),
            KernelError::NotImplemented => write!(f, "not implemented"),
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;

/// Negative-errno values used at the user/kernel syscall ABI boundary.
///
/// Numbered to match Linux where a number is assigned, per the external
/// interface contract.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    Eio = 5,
    Enoexec = 8,
    Ebadf = 9,
    Eagain = 11,
    Enomem = 12,
    Einval = 22,
    Enosys = 38,
}

impl Errno {
    /// Encode as the negative value placed in `x0`.
    pub const fn as_retval(self) -> i64 {
        -(self as i32 as i64)
    }
}

impl From<KernelError> for Errno {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::OutOfMemory => Errno::Enomem,
            KernelError::WouldBlock => Errno::Eagain,
            KernelError::InvalidAddress { .. }
            | KernelError::UnmappedMemory { .. }
            | KernelError::InvalidArgument { .. }
            | KernelError::ThreadTableFull
            | KernelError::InvalidThread => Errno::Einval,
            KernelError::BadFileDescriptor => Errno::Ebadf,
            KernelError::Io => Errno::Eio,
            KernelError::NotImplemented => Errno::Enosys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_encodes_negative() {
        assert_eq!(Errno::Einval.as_retval(), -22);
        assert_eq!(Errno::Eagain.as_retval(), -11);
    }

    #[test]
    fn conversion_maps_exhaustion_to_enomem() {
        assert_eq!(Errno::from(KernelError::OutOfMemory), Errno::Enomem);
        assert_eq!(Errno::from(KernelError::ThreadTableFull), Errno::Einval);
    }
}
