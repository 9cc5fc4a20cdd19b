//! A conservative mark-sweep garbage collector layered over an explicit-free
//! allocator.
//!
//! `conserve-gc` hands out raw, zero-filled blocks and remembers each one in a
//! sorted registry. A collection scans the thread's stack (after spilling
//! callee-saved registers), the static data segment and any registered root
//! regions for byte patterns that look like addresses inside a live block.
//! Every block reached that way, directly or through other reached blocks,
//! survives; the rest is returned to the underlying allocator.
//!
//! The collector knows nothing about the types stored in its blocks. Any
//! pointer-shaped value counts as a reference, so a coincidental integer can
//! keep a block alive (false retention). A block is never released while a
//! reference to it sits in scanned memory.
//!
//! # Quick Start
//!
//! ```
//! use conserve_gc::{Collector, GcConfig, RootBounds};
//!
//! let mut gc = Collector::with_config(
//!     conserve_gc::Malloc,
//!     GcConfig::default().roots(RootBounds::none()),
//! );
//!
//! let x = gc.allocate(16).unwrap();
//! let y = gc.allocate(16).unwrap();
//!
//! // Store X's address inside Y, then root Y.
//! unsafe { y.as_ptr().cast::<usize>().write_unaligned(x.as_ptr() as usize) };
//! let roots = [y.as_ptr() as usize];
//! unsafe { gc.register_root_region(roots.as_ptr().cast(), std::mem::size_of_val(&roots)) };
//!
//! gc.collect();
//! assert_eq!(gc.live_count(), 2);
//!
//! gc.clear_root_regions();
//! gc.collect();
//! assert_eq!(gc.live_count(), 0);
//! ```
//!
//! # The Thread-Local Heap
//!
//! The free functions [`allocate`], [`deallocate`], [`collect`] and
//! [`list_live_allocations`] operate on a per-thread collector whose roots
//! are detected from the platform.
//!
//! # Thread Safety
//!
//! [`Collector`] is `!Send` and `!Sync`: it scans the stack of the thread
//! that owns it.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod collector;
mod config;
mod error;
mod global;
mod metrics;
mod roots;
mod scan;
mod stack;

/// Mark and sweep internals.
///
/// This module is public for testing and advanced use cases.
/// Most users should go through [`Collector`].
pub mod gc;

/// The sorted allocation registry.
///
/// This module is public for testing and advanced use cases.
pub mod registry;

/// Structured tracing of collections (`tracing` feature).
pub mod tracing;

// Re-export public API
pub use collector::{Collector, LiveAllocation};
pub use config::{GcConfig, RootBounds, DEFAULT_COLLECT_INTERVAL};
pub use error::GcError;
pub use global::{
    allocate, collect, deallocate, is_collecting, last_gc_metrics, list_live_allocations,
    set_stack_bottom, with_collector,
};
pub use metrics::{CollectTrigger, CollectorStats, GcMetrics, PhaseTimer};
pub use roots::RootRegion;
pub use scan::ScanGranularity;
pub use sys_alloc::{Malloc, RawAlloc};

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod test_util {
    /// Clear CPU registers to prevent stale pointer values from being treated as roots.
    ///
    /// Useful in tests that expect a block to be reclaimed even though its
    /// address may linger in a callee-saved register after a call returns.
    ///
    /// # Safety
    ///
    /// This function clears callee-saved registers (R12-R15 on `x86_64`).
    /// It should only be called when those registers don't contain values
    /// needed by the calling code.
    pub unsafe fn clear_registers() {
        // SAFETY: Caller guarantees that callee-saved registers don't contain
        // values needed by the calling code.
        unsafe { crate::stack::clear_registers() };
    }
}
