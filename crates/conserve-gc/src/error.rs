//! Error kinds raised by the collector.
//!
//! Only [`GcError::OutOfMemory`] is ever returned to callers. The other
//! variants describe broken invariants; they are raised as panics so the
//! process stops before the registry is trusted again.

use std::fmt;

/// An error produced by the allocator front-end or the allocation registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// The raw allocator failed both before and after a forced collection.
    OutOfMemory {
        /// Number of bytes that were requested.
        requested: usize,
    },
    /// A release named an address that is not the start of a live allocation.
    InvalidRelease {
        /// The offending address.
        address: usize,
    },
    /// A fresh block overlaps an allocation that is still live.
    Overlap {
        /// Start of the new block.
        start: usize,
        /// Size of the new block.
        size: usize,
        /// Start of the live allocation it collides with.
        existing_start: usize,
        /// Size of the live allocation it collides with.
        existing_size: usize,
    },
}

impl GcError {
    /// Returns `true` for errors a caller can recover from.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory allocating {requested} bytes")
            }
            Self::InvalidRelease { address } => {
                write!(f, "invalid release of {address:#x}: not the start of a live allocation")
            }
            Self::Overlap {
                start,
                size,
                existing_start,
                existing_size,
            } => write!(
                f,
                "allocation {start:#x}+{size} overlaps live allocation {existing_start:#x}+{existing_size}"
            ),
        }
    }
}

impl std::error::Error for GcError {}
