//! GC metrics and statistics.

use std::time::{Duration, Instant};

/// What started a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CollectTrigger {
    /// No collection has run yet.
    #[default]
    None = 0,
    /// An explicit `collect()` call.
    Explicit = 1,
    /// The allocation counter reached a multiple of the collection interval.
    Interval = 2,
    /// The raw allocator (or heap limit) refused a request.
    Exhausted = 3,
}

impl CollectTrigger {
    /// Short lowercase name, used in tracing spans.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Explicit => "explicit",
            Self::Interval => "interval",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Statistics from the most recent garbage collection.
#[derive(Debug, Clone, Copy)]
pub struct GcMetrics {
    /// Duration of the whole collection.
    pub duration: Duration,
    /// Duration of the clear phase.
    pub clear_duration: Duration,
    /// Duration of the mark phase.
    pub mark_duration: Duration,
    /// Duration of the sweep phase.
    pub sweep_duration: Duration,
    /// Number of bytes reclaimed.
    pub bytes_reclaimed: usize,
    /// Number of bytes surviving.
    pub bytes_surviving: usize,
    /// Number of allocations reclaimed.
    pub objects_reclaimed: usize,
    /// Number of allocations surviving.
    pub objects_surviving: usize,
    /// Allocations found reachable during marking.
    pub objects_marked: usize,
    /// Bytes read while looking for candidate pointers.
    pub bytes_scanned: usize,
    /// Root regions scanned (stack, register spill, data segment, registered).
    pub root_regions: usize,
    /// Deepest the mark worklist got.
    pub worklist_peak: usize,
    /// What started this collection.
    pub trigger: CollectTrigger,
    /// Collections run by this collector so far, including this one.
    pub total_collections: usize,
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GcMetrics {
    /// Create a new `GcMetrics` with all fields set to zero/defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duration: Duration::ZERO,
            clear_duration: Duration::ZERO,
            mark_duration: Duration::ZERO,
            sweep_duration: Duration::ZERO,
            bytes_reclaimed: 0,
            bytes_surviving: 0,
            objects_reclaimed: 0,
            objects_surviving: 0,
            objects_marked: 0,
            bytes_scanned: 0,
            root_regions: 0,
            worklist_peak: 0,
            trigger: CollectTrigger::None,
            total_collections: 0,
        }
    }
}

/// Internal helper for capturing phase durations.
///
/// This struct is used by the collector to time the three GC phases:
/// - Clear: Reset reachable flags
/// - Mark: Scan roots and propagate reachability
/// - Sweep: Release unmarked allocations
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimer {
    /// Accumulated clear phase time.
    pub clear: Duration,
    /// Accumulated mark phase time.
    pub mark: Duration,
    /// Accumulated sweep phase time.
    pub sweep: Duration,
    /// Start time of current phase.
    current_start: Option<Instant>,
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTimer {
    /// Create a new `PhaseTimer` with all durations set to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clear: Duration::ZERO,
            mark: Duration::ZERO,
            sweep: Duration::ZERO,
            current_start: None,
        }
    }

    /// Start timing a phase.
    pub fn start(&mut self) {
        self.current_start = Some(Instant::now());
    }

    /// End the clear phase and record its duration.
    pub fn end_clear(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.clear = start.elapsed();
        }
    }

    /// End the mark phase and record its duration.
    pub fn end_mark(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.mark = start.elapsed();
        }
    }

    /// End the sweep phase and record its duration.
    pub fn end_sweep(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.sweep = start.elapsed();
        }
    }
}

/// Cumulative counters for one collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Calls to `allocate`.
    pub allocations: usize,
    /// `allocate` calls that ended in `OutOfMemory`.
    pub failed_allocations: usize,
    /// Explicit releases.
    pub deallocations: usize,
    /// Collections of any kind.
    pub collections: usize,
    /// Collections started by `collect()`.
    pub explicit_collections: usize,
    /// Collections started by the allocation interval.
    pub interval_collections: usize,
    /// Collections started by allocator exhaustion.
    pub exhausted_collections: usize,
    /// Bytes released by sweeps.
    pub bytes_reclaimed: usize,
    /// Allocations released by sweeps.
    pub objects_reclaimed: usize,
    /// Total time spent collecting.
    pub pause_ns: u64,
}

impl CollectorStats {
    /// Fold one collection's metrics into the running totals.
    pub fn record(&mut self, metrics: &GcMetrics) {
        self.collections += 1;
        match metrics.trigger {
            CollectTrigger::Explicit => self.explicit_collections += 1,
            CollectTrigger::Interval => self.interval_collections += 1,
            CollectTrigger::Exhausted => self.exhausted_collections += 1,
            CollectTrigger::None => {}
        }
        self.bytes_reclaimed += metrics.bytes_reclaimed;
        self.objects_reclaimed += metrics.objects_reclaimed;
        self.pause_ns = self
            .pause_ns
            .saturating_add(u64::try_from(metrics.duration.as_nanos()).unwrap_or(u64::MAX));
    }
}
