//! The per-thread default collector.
//!
//! Most programs want a single collector and free functions to reach it.
//! Each thread gets its own [`Collector`] over `malloc`, created on first
//! use with roots detected from the platform. Blocks from one thread's heap
//! must be released on that thread.

use std::cell::RefCell;
use std::ptr::NonNull;

use sys_alloc::Malloc;

use crate::collector::{Collector, LiveAllocation};
use crate::error::GcError;
use crate::metrics::GcMetrics;

// ============================================================================
// Thread-local heap access
// ============================================================================

thread_local! {
    static HEAP: RefCell<Collector<Malloc>> = RefCell::new(Collector::new());
}

/// Execute a function with access to the thread-local collector.
///
/// # Panics
///
/// Panics if called re-entrantly from inside `f`.
pub fn with_collector<F, R>(f: F) -> R
where
    F: FnOnce(&mut Collector<Malloc>) -> R,
{
    HEAP.with(|heap| f(&mut heap.borrow_mut()))
}

/// Override the detected stack bottom for this thread's collector.
///
/// Call this from `main` (or a thread's entry point) with the address of a
/// local when the platform cannot report stack bounds. A null pointer stops
/// stack scanning.
///
/// # Safety
///
/// `bottom` must point into the calling thread's stack, in a frame that
/// outlives every collection on this thread (the entry point's own frame).
pub unsafe fn set_stack_bottom(bottom: *const u8) {
    if bottom.is_null() {
        with_collector(Collector::clear_stack_bottom);
    } else {
        // SAFETY: forwarded from the caller.
        with_collector(|gc| unsafe { gc.set_stack_bottom(bottom as usize) });
    }
}

/// Allocate `size` zeroed bytes from this thread's collector.
///
/// # Errors
///
/// Returns [`GcError::OutOfMemory`] if the request cannot be satisfied even
/// after a collection.
pub fn allocate(size: usize) -> Result<NonNull<u8>, GcError> {
    with_collector(|gc| gc.allocate(size))
}

/// Release a block from this thread's collector. Null is ignored.
///
/// # Panics
///
/// Panics if `ptr` is not the start of a live allocation.
pub fn deallocate(ptr: *mut u8) {
    with_collector(|gc| gc.deallocate(ptr));
}

/// Run a full collection on this thread's collector.
pub fn collect() {
    with_collector(Collector::collect);
}

/// Snapshot of this thread's live allocations, in address order.
#[must_use]
pub fn list_live_allocations() -> Vec<LiveAllocation> {
    with_collector(|gc| gc.list_live_allocations())
}

/// Get metrics from the last collection on this thread.
#[must_use]
pub fn last_gc_metrics() -> GcMetrics {
    with_collector(|gc| gc.last_metrics())
}

/// Returns `true` while this thread's collector is busy collecting.
///
/// Never panics: a collector that is currently borrowed counts as busy.
#[must_use]
pub fn is_collecting() -> bool {
    HEAP.with(|heap| heap.try_borrow().map_or(true, |gc| gc.is_collecting()))
}
