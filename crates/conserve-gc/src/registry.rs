//! The allocation registry.
//!
//! Every block handed out by the collector is recorded here, in a vector
//! sorted by start address. Records never overlap, so a binary search over
//! start addresses resolves any address (including interior pointers) to the
//! single allocation containing it in O(log n).
//!
//! # Invariants
//!
//! - Records are sorted ascending by `start`.
//! - For consecutive records `a`, `b`: `a.start + a.size <= b.start`.
//! - Every record has a non-zero size.
//!
//! Violations are programmer or allocator bugs and panic.

use crate::error::GcError;

/// Initial number of record slots reserved by [`Registry::new`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// One live, contiguous block owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    start: usize,
    size: usize,
    reachable: bool,
}

impl Allocation {
    /// Address of the first byte.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// One past the last byte.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.size
    }

    /// Returns `true` if `addr` falls in `[start, end)`.
    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Whether the current (or last) mark phase reached this allocation.
    ///
    /// Only meaningful between a mark phase and the following sweep.
    #[inline]
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        self.reachable
    }
}

/// Sorted, non-overlapping index of live allocations.
#[derive(Debug)]
pub struct Registry {
    allocs: Vec<Allocation>,
    live_bytes: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry with [`DEFAULT_CAPACITY`] slots reserved.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty registry with room for `capacity` records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocs: Vec::with_capacity(capacity),
            live_bytes: 0,
        }
    }

    /// Number of live allocations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.allocs.len()
    }

    /// Returns `true` if nothing is allocated.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocs.is_empty()
    }

    /// Number of records the backing storage can hold before growing.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.allocs.capacity()
    }

    /// Total bytes across all live allocations.
    #[inline]
    #[must_use]
    pub const fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Iterate over live allocations in address order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Allocation> + '_ {
        self.allocs.iter()
    }

    /// Return the index where `addr` belongs.
    ///
    /// If some record contains `addr` its index is returned; otherwise the
    /// index at which a record starting at `addr` would be inserted.
    #[must_use]
    pub fn locate_slot(&self, addr: usize) -> usize {
        let (mut lo, mut hi) = (0, self.allocs.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let alloc = &self.allocs[mid];
            if addr < alloc.start {
                hi = mid;
            } else if addr >= alloc.end() {
                lo = mid + 1;
            } else {
                return mid;
            }
        }
        lo
    }

    /// Return the live allocation containing `addr`, if any.
    #[must_use]
    pub fn find_containing(&self, addr: usize) -> Option<&Allocation> {
        let slot = self.locate_slot(addr);
        self.allocs.get(slot).filter(|alloc| alloc.contains(addr))
    }

    /// Mutable variant of [`find_containing`](Self::find_containing), used
    /// by the mark phase to flip `reachable`.
    pub(crate) fn find_containing_mut(&mut self, addr: usize) -> Option<&mut Allocation> {
        let slot = self.locate_slot(addr);
        self.allocs
            .get_mut(slot)
            .filter(|alloc| alloc.contains(addr))
    }

    /// Check that `[start, start + size)` can be inserted.
    ///
    /// Returns the insertion slot, or [`GcError::Overlap`] naming the live
    /// allocation the range collides with.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::Overlap`] if the range intersects a live record.
    pub fn check_insert(&self, start: usize, size: usize) -> Result<usize, GcError> {
        let end = start.saturating_add(size);
        let slot = self.locate_slot(start);

        let collides = |alloc: &Allocation| GcError::Overlap {
            start,
            size,
            existing_start: alloc.start,
            existing_size: alloc.size,
        };

        if let Some(next) = self.allocs.get(slot) {
            if end > next.start {
                return Err(collides(next));
            }
        }
        if let Some(prev) = slot.checked_sub(1).and_then(|i| self.allocs.get(i)) {
            if prev.end() > start {
                return Err(collides(prev));
            }
        }
        Ok(slot)
    }

    /// Record a new allocation and return its index.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or the range overlaps a live allocation.
    pub fn insert(&mut self, start: usize, size: usize) -> usize {
        assert!(size > 0, "zero-sized allocation at {start:#x}");
        let slot = match self.check_insert(start, size) {
            Ok(slot) => slot,
            Err(err) => panic!("{err}"),
        };

        if self.allocs.len() == self.allocs.capacity() {
            // Double the backing storage.
            let additional = self.allocs.capacity().max(1);
            self.allocs.reserve_exact(additional);
        }

        self.allocs.insert(
            slot,
            Allocation {
                start,
                size,
                reachable: false,
            },
        );
        self.live_bytes += size;
        slot
    }

    /// Remove the allocation starting exactly at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::InvalidRelease`] if no live allocation starts at
    /// `start` (including when `start` is an interior address).
    pub fn try_remove(&mut self, start: usize) -> Result<Allocation, GcError> {
        let slot = self.locate_slot(start);
        match self.allocs.get(slot) {
            Some(alloc) if alloc.start == start => {
                let alloc = self.allocs.remove(slot);
                self.live_bytes -= alloc.size;
                Ok(alloc)
            }
            _ => Err(GcError::InvalidRelease { address: start }),
        }
    }

    /// Remove the allocation starting exactly at `start`.
    ///
    /// # Panics
    ///
    /// Panics if no live allocation starts at `start`.
    pub fn remove(&mut self, start: usize) -> Allocation {
        match self.try_remove(start) {
            Ok(alloc) => alloc,
            Err(err) => panic!("{err}"),
        }
    }

    /// Reset every `reachable` flag. Returns the number of records cleared.
    pub(crate) fn clear_marks(&mut self) -> usize {
        for alloc in &mut self.allocs {
            alloc.reachable = false;
        }
        self.allocs.len()
    }

    /// Mark the allocation containing `addr`.
    ///
    /// Returns the allocation if it was unmarked before this call, so the
    /// caller can schedule its contents for scanning.
    #[inline]
    pub(crate) fn mark_containing(&mut self, addr: usize) -> Option<Allocation> {
        let alloc = self.find_containing_mut(addr)?;
        if alloc.reachable {
            return None;
        }
        alloc.reachable = true;
        Some(*alloc)
    }

    /// Remove every unreachable record, handing each to `release`.
    ///
    /// Order of the remaining records is preserved and no record is skipped
    /// when its neighbour is removed.
    pub(crate) fn sweep_unreachable<F>(&mut self, mut release: F) -> usize
    where
        F: FnMut(&Allocation),
    {
        let mut freed_bytes = 0;
        self.allocs.retain(|alloc| {
            if alloc.reachable {
                return true;
            }
            freed_bytes += alloc.size;
            release(alloc);
            false
        });
        self.live_bytes -= freed_bytes;
        freed_bytes
    }

    /// Remove every record, handing each to `release`.
    pub(crate) fn drain<F>(&mut self, release: F)
    where
        F: FnMut(Allocation),
    {
        self.allocs.drain(..).for_each(release);
        self.live_bytes = 0;
    }

    /// Check the ordering and non-overlap invariants.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.allocs.iter().all(|alloc| alloc.size > 0)
            && self
                .allocs
                .windows(2)
                .all(|pair| pair[0].end() <= pair[1].start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(ranges: &[(usize, usize)]) -> Registry {
        let mut registry = Registry::with_capacity(4);
        for &(start, size) in ranges {
            registry.insert(start, size);
        }
        registry
    }

    #[test]
    fn test_insert_keeps_order() {
        let registry = registry_with(&[(0x300, 16), (0x100, 16), (0x200, 32)]);

        let starts: Vec<usize> = registry.iter().map(Allocation::start).collect();
        assert_eq!(starts, vec![0x100, 0x200, 0x300]);
        assert_eq!(registry.live_bytes(), 64);
        assert!(registry.is_well_formed());
    }

    #[test]
    fn test_locate_slot() {
        let registry = registry_with(&[(0x100, 16), (0x200, 16)]);

        assert_eq!(registry.locate_slot(0x50), 0);
        assert_eq!(registry.locate_slot(0x100), 0);
        assert_eq!(registry.locate_slot(0x10f), 0);
        assert_eq!(registry.locate_slot(0x110), 1);
        assert_eq!(registry.locate_slot(0x208), 1);
        assert_eq!(registry.locate_slot(0x210), 2);
        assert_eq!(Registry::new().locate_slot(0x100), 0);
    }

    #[test]
    fn test_find_containing_bounds() {
        let registry = registry_with(&[(0x100, 16)]);

        assert!(registry.find_containing(0xff).is_none());
        assert_eq!(registry.find_containing(0x100).map(Allocation::start), Some(0x100));
        assert_eq!(registry.find_containing(0x10f).map(Allocation::start), Some(0x100));
        assert!(registry.find_containing(0x110).is_none());
    }

    #[test]
    fn test_adjacent_ranges_allowed() {
        let registry = registry_with(&[(0x100, 16), (0x110, 16), (0xf0, 16)]);
        assert_eq!(registry.len(), 3);
        assert!(registry.is_well_formed());
    }

    #[test]
    fn test_check_insert_reports_collision() {
        let registry = registry_with(&[(0x100, 16), (0x200, 16)]);

        assert_eq!(registry.check_insert(0x110, 0xf0), Ok(1));
        assert_eq!(
            registry.check_insert(0x1f8, 16),
            Err(GcError::Overlap {
                start: 0x1f8,
                size: 16,
                existing_start: 0x200,
                existing_size: 16,
            })
        );
        assert!(registry.check_insert(0x108, 4).is_err());
    }

    #[test]
    #[should_panic(expected = "overlaps live allocation")]
    fn test_overlapping_insert_panics() {
        let mut registry = registry_with(&[(0x100, 32)]);
        registry.insert(0x110, 8);
    }

    #[test]
    #[should_panic(expected = "zero-sized allocation")]
    fn test_zero_sized_insert_panics() {
        let mut registry = Registry::new();
        registry.insert(0x100, 0);
    }

    #[test]
    fn test_remove_exact_match() {
        let mut registry = registry_with(&[(0x100, 16), (0x200, 16), (0x300, 16)]);

        let removed = registry.remove(0x200);
        assert_eq!(removed.start(), 0x200);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.live_bytes(), 32);
        assert!(registry.find_containing(0x208).is_none());
        assert!(registry.is_well_formed());
    }

    #[test]
    fn test_try_remove_rejects_interior_and_foreign() {
        let mut registry = registry_with(&[(0x100, 16)]);

        assert_eq!(
            registry.try_remove(0x108),
            Err(GcError::InvalidRelease { address: 0x108 })
        );
        assert!(registry.try_remove(0x400).is_err());
        assert!(registry.try_remove(0x100).is_ok());
        assert!(registry.try_remove(0x100).is_err(), "double release");
    }

    #[test]
    #[should_panic(expected = "invalid release")]
    fn test_remove_interior_panics() {
        let mut registry = registry_with(&[(0x100, 16)]);
        registry.remove(0x104);
    }

    #[test]
    fn test_storage_doubles() {
        let mut registry = Registry::with_capacity(4);
        for i in 0..4 {
            registry.insert(0x1000 + i * 0x10, 8);
        }
        let before = registry.capacity();
        registry.insert(0x2000, 8);
        assert!(registry.capacity() >= before * 2);
    }

    #[test]
    fn test_mark_and_sweep_unreachable() {
        let mut registry = registry_with(&[(0x100, 16), (0x200, 16), (0x300, 16), (0x400, 16)]);

        assert_eq!(registry.clear_marks(), 4);
        assert!(registry.mark_containing(0x208).is_some());
        assert!(registry.mark_containing(0x200).is_none(), "already marked");
        assert!(registry.mark_containing(0x400).is_some());
        assert!(registry.mark_containing(0x500).is_none());

        let mut released = Vec::new();
        let freed = registry.sweep_unreachable(|alloc| released.push(alloc.start()));

        assert_eq!(released, vec![0x100, 0x300]);
        assert_eq!(freed, 32);
        let starts: Vec<usize> = registry.iter().map(Allocation::start).collect();
        assert_eq!(starts, vec![0x200, 0x400]);
        assert_eq!(registry.live_bytes(), 32);
    }

    #[test]
    fn test_sweep_consecutive_unreachable() {
        let mut registry = registry_with(&[(0x100, 16), (0x110, 16), (0x120, 16)]);
        registry.clear_marks();

        let mut count = 0;
        registry.sweep_unreachable(|_| count += 1);

        assert_eq!(count, 3);
        assert!(registry.is_empty());
        assert_eq!(registry.live_bytes(), 0);
    }
}
