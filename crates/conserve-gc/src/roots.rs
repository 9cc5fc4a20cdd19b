//! Explicitly registered root regions.
//!
//! The stack and the data segment cover most roots. Memory the collector
//! cannot see otherwise (buffers from another allocator, memory-mapped
//! tables, a thread's stack other than the collecting one) can be registered
//! here and is scanned on every cycle.

/// A registered `[base, base + len)` region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootRegion {
    base: usize,
    len: usize,
}

impl RootRegion {
    /// Describe a region.
    #[must_use]
    pub const fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    /// First byte of the region.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the region is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The set of registered root regions.
#[derive(Debug, Default)]
pub struct RootSet {
    regions: Vec<RootRegion>,
}

impl RootSet {
    /// Create an empty root set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Register a region.
    pub fn push(&mut self, region: RootRegion) {
        self.regions.push(region);
    }

    /// Unregister the first region starting at `base`. Returns whether one
    /// was found.
    pub fn remove(&mut self, base: usize) -> bool {
        if let Some(pos) = self.regions.iter().position(|r| r.base == base) {
            self.regions.swap_remove(pos);
            true
        } else {
            false
        }
    }

    /// Number of registered regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Iterate over all regions.
    pub fn iter(&self) -> impl Iterator<Item = RootRegion> + '_ {
        self.regions.iter().copied()
    }

    /// Unregister everything.
    pub fn clear(&mut self) {
        self.regions.clear();
    }
}
