//! Allocator error types.
//!
//! Every fallible allocator operation reports failure through its return
//! value. [`AllocError::kind`] groups the variants into the three failure
//! classes callers usually branch on.

use std::error::Error;
use std::fmt;

use bedrock_vm::VmError;

/// Broad class of an [`AllocError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The reservation, commit limit or a bookkeeping table ran out.
    Exhaustion,
    /// The caller passed something the allocator does not own or in a
    /// state it cannot accept.
    Misuse,
    /// The virtual memory provider refused an operation.
    Os,
}

/// Errors that can occur during allocator operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// Not enough reserved space is left to satisfy the request.
    Exhausted {
        /// Number of bytes requested (after alignment).
        requested: usize,
        /// Bytes still available in the reservation.
        available: usize,
    },
    /// A size computation overflowed `usize`.
    SizeOverflow,
    /// A smart allocator reached its tracked-block ceiling.
    TableFull {
        /// The configured maximum number of tracked blocks.
        max: usize,
    },
    /// The pointer does not address a block owned by this allocator.
    ForeignPointer,
    /// The pointer is not aligned to the allocator's alignment.
    Misaligned,
    /// The block was already free.
    DoubleFree,
    /// The block header failed a consistency check.
    CorruptHeader,
    /// A handle refers to an entry that has since been removed.
    StaleHandle,
    /// A positional argument was past the end of a container.
    IndexOutOfBounds {
        /// The index passed by the caller.
        index: usize,
        /// Current number of elements.
        len: usize,
    },
    /// An arena level was closed while a more recent level was still open.
    LevelOutOfOrder {
        /// Depth of the innermost open level.
        expected: u32,
        /// Depth of the level passed to `close_level`.
        found: u32,
    },
    /// An arena level belongs to another arena or predates a `clear`.
    StaleLevel,
    /// The element type needs stronger alignment than the allocator gives.
    UnsupportedAlignment {
        /// Alignment required by the type.
        align: usize,
        /// Alignment the allocator guarantees.
        max: usize,
    },
    /// A configuration value was rejected.
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The virtual memory provider failed.
    Os(VmError),
}

impl AllocError {
    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Exhausted { .. } | Self::SizeOverflow | Self::TableFull { .. } => {
                ErrorKind::Exhaustion
            }
            Self::Os(_) => ErrorKind::Os,
            Self::ForeignPointer
            | Self::Misaligned
            | Self::DoubleFree
            | Self::CorruptHeader
            | Self::StaleHandle
            | Self::IndexOutOfBounds { .. }
            | Self::LevelOutOfOrder { .. }
            | Self::StaleLevel
            | Self::UnsupportedAlignment { .. }
            | Self::InvalidConfig { .. } => ErrorKind::Misuse,
        }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted {
                requested,
                available,
            } => write!(
                f,
                "allocator exhausted: requested {requested} bytes, {available} bytes available"
            ),
            Self::SizeOverflow => write!(f, "allocation size overflows usize"),
            Self::TableFull { max } => {
                write!(f, "tracking table full: at most {max} live blocks")
            }
            Self::ForeignPointer => write!(f, "pointer is not owned by this allocator"),
            Self::Misaligned => write!(f, "pointer is misaligned"),
            Self::DoubleFree => write!(f, "block is already free"),
            Self::CorruptHeader => write!(f, "block header failed validation"),
            Self::StaleHandle => write!(f, "handle refers to a removed entry"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::LevelOutOfOrder { expected, found } => write!(
                f,
                "arena level closed out of order: innermost is depth {expected}, got depth {found}"
            ),
            Self::StaleLevel => write!(f, "arena level belongs to another arena or epoch"),
            Self::UnsupportedAlignment { align, max } => {
                write!(f, "alignment {align} exceeds allocator alignment {max}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Os(err) => write!(f, "virtual memory error: {err}"),
        }
    }
}

impl Error for AllocError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Os(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VmError> for AllocError {
    fn from(err: VmError) -> Self {
        Self::Os(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let exhausted = AllocError::Exhausted {
            requested: 32,
            available: 16,
        };
        assert_eq!(exhausted.kind(), ErrorKind::Exhaustion);
        assert_eq!(AllocError::TableFull { max: 4 }.kind(), ErrorKind::Exhaustion);
        assert_eq!(AllocError::DoubleFree.kind(), ErrorKind::Misuse);
        assert_eq!(AllocError::StaleLevel.kind(), ErrorKind::Misuse);
        assert_eq!(AllocError::Os(VmError::ZeroSize).kind(), ErrorKind::Os);
    }

    #[test]
    fn os_errors_expose_source() {
        let err: AllocError = VmError::CommitFailed { size: 8, errno: 1 }.into();
        assert!(err.source().is_some());
        assert!(AllocError::ForeignPointer.source().is_none());
    }

    #[test]
    fn display_includes_numbers() {
        let msg = AllocError::LevelOutOfOrder {
            expected: 2,
            found: 0,
        }
        .to_string();
        assert!(msg.contains("depth 2"));
        assert!(msg.contains("depth 0"));
    }
}
