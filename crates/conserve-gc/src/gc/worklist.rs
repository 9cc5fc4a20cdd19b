//! Explicit worklist for transitive marking.
//!
//! Reachability is propagated iteratively: an allocation is marked the moment
//! it is discovered and its extent is pushed here for a later scan. Because
//! marking happens before the push, each allocation enters the worklist at
//! most once per cycle and cyclic graphs terminate. The native call stack
//! never grows with the length of a reference chain.

/// An allocation whose contents still have to be scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingScan {
    /// Start address of the allocation.
    pub start: usize,
    /// Number of bytes to scan.
    pub len: usize,
}

/// LIFO queue of pending scans.
#[derive(Debug, Default)]
pub struct Worklist {
    items: Vec<PendingScan>,
    peak: usize,
}

impl Worklist {
    /// Create a worklist with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            peak: 0,
        }
    }

    /// Schedule `[start, start + len)` for scanning.
    #[inline]
    pub fn push(&mut self, start: usize, len: usize) {
        self.items.push(PendingScan { start, len });
        self.peak = self.peak.max(self.items.len());
    }

    /// Take the most recently scheduled scan.
    #[inline]
    pub fn pop(&mut self) -> Option<PendingScan> {
        self.items.pop()
    }

    /// Number of pending scans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Largest number of entries pending at once since creation.
    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }
}
