//! Sweep phase.

use std::ptr::NonNull;

use sys_alloc::RawAlloc;

use crate::registry::Registry;

/// Counters gathered during one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Allocations released.
    pub objects_reclaimed: usize,
    /// Bytes released.
    pub bytes_reclaimed: usize,
    /// Allocations still live afterwards.
    pub objects_surviving: usize,
    /// Bytes still live afterwards.
    pub bytes_surviving: usize,
}

/// Release every allocation the mark phase did not reach.
///
/// Each unreachable record is removed from the registry and its block handed
/// back to `raw`, exactly as an explicit release would.
pub fn sweep<A: RawAlloc + ?Sized>(registry: &mut Registry, raw: &mut A) -> SweepStats {
    let mut objects_reclaimed = 0;
    let bytes_reclaimed = registry.sweep_unreachable(|alloc| {
        objects_reclaimed += 1;
        if let Some(block) = NonNull::new(std::ptr::with_exposed_provenance_mut::<u8>(alloc.start())) {
            // SAFETY: the record owned this block and has just been removed,
            // so nothing else will release it.
            unsafe { raw.deallocate(block, alloc.size()) };
        }
    });

    SweepStats {
        objects_reclaimed,
        bytes_reclaimed,
        objects_surviving: registry.len(),
        bytes_surviving: registry.live_bytes(),
    }
}
