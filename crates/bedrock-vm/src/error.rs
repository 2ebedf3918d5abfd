//! Virtual memory error types.

use std::error::Error;
use std::fmt;

/// Errors reported by a [`VirtualMemory`](crate::VirtualMemory) provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VmError {
    /// A zero-byte reservation was requested.
    ZeroSize,
    /// The OS refused to reserve the address range.
    ReserveFailed {
        /// Number of bytes requested.
        size: usize,
        /// Raw OS error code, `0` if unavailable.
        errno: i32,
    },
    /// The OS refused to back a range with read/write pages.
    CommitFailed {
        /// Number of bytes the commit covered.
        size: usize,
        /// Raw OS error code, `0` if unavailable.
        errno: i32,
    },
    /// The OS refused to drop the backing of a range.
    DecommitFailed {
        /// Number of bytes the decommit covered.
        size: usize,
        /// Raw OS error code, `0` if unavailable.
        errno: i32,
    },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "cannot reserve a zero-sized address range"),
            Self::ReserveFailed { size, errno } => {
                write!(f, "failed to reserve {size} bytes of address space (os error {errno})")
            }
            Self::CommitFailed { size, errno } => {
                write!(f, "failed to commit {size} bytes (os error {errno})")
            }
            Self::DecommitFailed { size, errno } => {
                write!(f, "failed to decommit {size} bytes (os error {errno})")
            }
        }
    }
}

impl Error for VmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_size_and_errno() {
        let err = VmError::ReserveFailed {
            size: 4096,
            errno: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("12"));
    }
}
