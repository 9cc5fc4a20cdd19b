//! GC tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! tracing spans and events for garbage collection operations.

/// Span and event helpers used by the collector.
#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    use crate::metrics::CollectTrigger;

    /// High-level GC phases (clear/mark/sweep).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GcPhase {
        /// Reset reachable flags.
        Clear,
        /// Scan roots and propagate reachability.
        Mark,
        /// Release unreachable allocations.
        Sweep,
    }

    /// Stable identifier for a GC run.
    ///
    /// Used to correlate all events within a single collection. Monotonically
    /// increasing across every collector in the process, starting at 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    /// Global counter for generating unique GC IDs.
    static NEXT_GC_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique GC ID.
    pub fn next_gc_id() -> GcId {
        GcId(NEXT_GC_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a span for the entire GC collection.
    pub fn trace_gc_collection(trigger: CollectTrigger, gc_id: GcId) -> span::EnteredSpan {
        span!(
            Level::DEBUG,
            "gc_collect",
            trigger = trigger.as_str(),
            gc_id = gc_id.0
        )
        .entered()
    }

    /// Create a span for a GC phase (clear/mark/sweep).
    pub fn trace_phase(phase: GcPhase) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_phase", phase = ?phase).entered()
    }

    /// Log the start of a GC phase.
    pub fn log_phase_start(phase: GcPhase, live_bytes: usize) {
        tracing::debug!(phase = ?phase, live_bytes, "phase_start");
    }

    /// Log the end of the mark phase.
    pub fn log_phase_end_mark(objects_marked: usize, bytes_scanned: usize) {
        tracing::debug!(
            phase = ?GcPhase::Mark,
            objects_marked,
            bytes_scanned,
            "phase_end"
        );
    }

    /// Log the end of a GC phase.
    pub fn log_phase_end(phase: GcPhase, bytes_reclaimed: usize) {
        tracing::debug!(phase = ?phase, bytes_reclaimed, "phase_end");
    }

    /// Log a root region about to be scanned.
    pub fn log_root_region(kind: &str, base: usize, len: usize) {
        tracing::trace!(kind, base, len, "root_region");
    }

    /// Log an allocation that failed even after collecting.
    pub fn log_out_of_memory(requested: usize, live_bytes: usize) {
        tracing::debug!(requested, live_bytes, "out_of_memory");
    }
}

/// Stubs used when the `tracing` feature is off.
#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    /// Stub function when tracing is disabled.
    #[must_use]
    pub const fn next_gc_id() -> GcId {
        GcId(0)
    }
}

pub use internal::GcId;
