//! Mark phase.

use crate::gc::worklist::Worklist;
use crate::registry::Registry;
use crate::scan::ScanGranularity;

/// Counters gathered during one mark phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkStats {
    /// Allocations newly found reachable.
    pub objects_marked: usize,
    /// Bytes read while looking for candidates (roots and allocations).
    pub bytes_scanned: usize,
    /// Root regions scanned.
    pub root_regions: usize,
    /// Deepest the worklist got.
    pub worklist_peak: usize,
}

/// Conservative marker over a registry.
///
/// Roots are fed in with [`scan_root`](Self::scan_root); every allocation a
/// candidate resolves to is marked and queued, and
/// [`process_worklist`](Self::process_worklist) scans queued allocations
/// until nothing new is found.
pub struct Marker<'r> {
    registry: &'r mut Registry,
    granularity: ScanGranularity,
    worklist: Worklist,
    stats: MarkStats,
}

impl<'r> Marker<'r> {
    /// Create a marker. The registry's marks should already be cleared.
    pub fn new(registry: &'r mut Registry, granularity: ScanGranularity) -> Self {
        Self {
            registry,
            granularity,
            worklist: Worklist::with_capacity(1024),
            stats: MarkStats::default(),
        }
    }

    /// Scan a root region.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of `len` bytes.
    pub unsafe fn scan_root(&mut self, base: *const u8, len: usize) {
        self.stats.root_regions += 1;
        unsafe { self.scan_region(base, len) };
    }

    /// Look for candidate addresses in `[base, base + len)`, marking and
    /// queueing every unmarked allocation they resolve to.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of `len` bytes.
    unsafe fn scan_region(&mut self, base: *const u8, len: usize) {
        self.stats.bytes_scanned += len;

        // SAFETY: forwarded from the caller.
        for candidate in unsafe { self.granularity.candidates(base, len) } {
            if let Some(alloc) = self.registry.mark_containing(candidate) {
                self.stats.objects_marked += 1;
                self.worklist.push(alloc.start(), alloc.size());
            }
        }
    }

    /// Scan queued allocations until the reachable set stops growing.
    pub fn process_worklist(&mut self) {
        while let Some(pending) = self.worklist.pop() {
            let base = std::ptr::with_exposed_provenance::<u8>(pending.start);
            // SAFETY: queued ranges come from live registry records, which own
            // their blocks until the sweep.
            unsafe { self.scan_region(base, pending.len) };
        }
    }

    /// Drain the worklist and return the counters.
    pub fn finish(mut self) -> MarkStats {
        self.process_worklist();
        self.stats.worklist_peak = self.worklist.peak();
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    /// Heap nodes with pointer-sized slots, registered without going through
    /// a raw allocator so the test owns their memory.
    struct Nodes {
        blocks: Vec<Box<[usize; 2]>>,
        registry: Registry,
    }

    impl Nodes {
        fn new(count: usize) -> Self {
            let blocks: Vec<Box<[usize; 2]>> = (0..count).map(|_| Box::new([0usize; 2])).collect();
            let mut registry = Registry::with_capacity(count);
            for block in &blocks {
                registry.insert(addr(block), 2 * size_of::<usize>());
            }
            Self { blocks, registry }
        }

        fn link(&mut self, from: usize, to: usize) {
            let target = addr(&self.blocks[to]);
            self.blocks[from][0] = target;
        }

        fn is_marked(&self, index: usize) -> bool {
            self.registry
                .find_containing(addr(&self.blocks[index]))
                .is_some_and(|alloc| alloc.is_reachable())
        }
    }

    fn addr(block: &[usize; 2]) -> usize {
        block.as_ptr() as usize
    }

    fn mark_from(nodes: &mut Nodes, roots: &[usize]) -> MarkStats {
        nodes.registry.clear_marks();
        let mut marker = Marker::new(&mut nodes.registry, ScanGranularity::Byte);
        unsafe { marker.scan_root(roots.as_ptr().cast(), std::mem::size_of_val(roots)) };
        marker.finish()
    }

    #[test]
    fn test_marks_transitively() {
        let mut nodes = Nodes::new(4);
        nodes.link(0, 1);
        nodes.link(1, 2);

        let root = [addr(&nodes.blocks[0])];
        let stats = mark_from(&mut nodes, &root);

        assert!(nodes.is_marked(0));
        assert!(nodes.is_marked(1));
        assert!(nodes.is_marked(2));
        assert!(!nodes.is_marked(3));
        assert_eq!(stats.objects_marked, 3);
        assert_eq!(stats.root_regions, 1);
    }

    #[test]
    fn test_interior_pointer_marks_allocation() {
        let mut nodes = Nodes::new(2);
        let root = [addr(&nodes.blocks[1]) + 3];
        mark_from(&mut nodes, &root);

        assert!(!nodes.is_marked(0));
        assert!(nodes.is_marked(1));
    }

    #[test]
    fn test_cycle_terminates() {
        let mut nodes = Nodes::new(3);
        nodes.link(0, 1);
        nodes.link(1, 2);
        nodes.link(2, 0);

        let root = [addr(&nodes.blocks[1])];
        let stats = mark_from(&mut nodes, &root);

        assert_eq!(stats.objects_marked, 3);
        assert!((0..3).all(|i| nodes.is_marked(i)));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        const DEPTH: usize = 100_000;
        let mut nodes = Nodes::new(DEPTH);
        for i in 0..DEPTH - 1 {
            nodes.link(i, i + 1);
        }

        let root = [addr(&nodes.blocks[0])];
        let stats = mark_from(&mut nodes, &root);

        assert_eq!(stats.objects_marked, DEPTH);
        assert!(nodes.is_marked(DEPTH - 1));
        assert!(stats.worklist_peak < 64);
    }

    #[test]
    fn test_empty_root_marks_nothing() {
        let mut nodes = Nodes::new(2);
        let stats = mark_from(&mut nodes, &[]);

        assert_eq!(stats.objects_marked, 0);
        assert!(!nodes.is_marked(0));
        assert!(!nodes.is_marked(1));
    }
}
