//! Collector configuration.
//!
//! Platform-specific root bounds are never discovered by the collector
//! itself. They arrive through [`RootBounds`], which platform integration
//! code fills in (usually via [`RootBounds::detect`]).

use std::ops::Range;

use crate::registry::DEFAULT_CAPACITY;
use crate::scan::ScanGranularity;

/// Number of allocation calls between forced collections (2^16).
pub const DEFAULT_COLLECT_INTERVAL: usize = 1 << 16;

/// Where the mark phase looks for roots besides explicitly registered regions.
///
/// Every byte in these ranges is read on each collection, so bounds can only
/// come from the platform ([`detect`](Self::detect)) or through the `unsafe`
/// setters, whose callers vouch that the memory is readable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootBounds {
    stack_bottom: Option<usize>,
    data_segment: Option<Range<usize>>,
}

impl RootBounds {
    /// No platform roots: only registered root regions are scanned.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            stack_bottom: None,
            data_segment: None,
        }
    }

    /// Ask the platform for the calling thread's stack bottom and the data
    /// segment bounds.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            stack_bottom: sys_alloc::stack_bounds().map(|bounds| bounds.bottom),
            data_segment: sys_alloc::data_segment(),
        }
    }

    /// Highest address of the mutator's stack. The stack is scanned from the
    /// live frame at collection time up to (not including) this address.
    #[must_use]
    pub const fn stack_bottom(&self) -> Option<usize> {
        self.stack_bottom
    }

    /// Bounds of the static data segment.
    #[must_use]
    pub const fn data_segment(&self) -> Option<&Range<usize>> {
        self.data_segment.as_ref()
    }

    /// Set the recorded stack bottom.
    ///
    /// # Safety
    ///
    /// `bottom` must lie inside the stack of the thread that will collect,
    /// above every frame live at collection time, so that the whole range
    /// from the collecting frame up to `bottom` is mapped.
    #[must_use]
    pub const unsafe fn with_stack_bottom(mut self, bottom: usize) -> Self {
        self.stack_bottom = Some(bottom);
        self
    }

    /// Forget the recorded stack bottom. The stack is no longer scanned.
    #[must_use]
    pub const fn without_stack_bottom(mut self) -> Self {
        self.stack_bottom = None;
        self
    }

    /// Set the data segment bounds.
    ///
    /// Bounds that are not vouched for cannot be set from safe code:
    ///
    /// ```compile_fail,E0133
    /// use conserve_gc::RootBounds;
    ///
    /// let _ = RootBounds::none().with_data_segment(0x10..0x4000);
    /// ```
    ///
    /// # Safety
    ///
    /// Every byte of `segment` must stay readable for as long as a collector
    /// uses these bounds.
    #[must_use]
    pub unsafe fn with_data_segment(mut self, segment: Range<usize>) -> Self {
        self.data_segment = Some(segment);
        self
    }
}

/// Configuration for a [`Collector`](crate::Collector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Collect every time the allocation counter reaches a multiple of this.
    /// Zero disables the interval trigger.
    pub collect_interval: usize,
    /// Registry slots reserved up front.
    pub initial_capacity: usize,
    /// How candidate pointers are extracted from scanned memory.
    pub granularity: ScanGranularity,
    /// Soft cap on live bytes. A request that would exceed it is handled
    /// exactly like a raw allocator failure.
    pub heap_limit: Option<usize>,
    /// Platform root bounds.
    pub roots: RootBounds,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            collect_interval: DEFAULT_COLLECT_INTERVAL,
            initial_capacity: DEFAULT_CAPACITY,
            granularity: ScanGranularity::Byte,
            heap_limit: None,
            roots: RootBounds::none(),
        }
    }
}

impl GcConfig {
    /// Default configuration with roots detected from the platform.
    #[must_use]
    pub fn detect() -> Self {
        Self::default().roots(RootBounds::detect())
    }

    /// Sets the allocation interval between forced collections.
    #[must_use]
    pub const fn collect_interval(mut self, interval: usize) -> Self {
        self.collect_interval = interval;
        self
    }

    /// Sets the initial registry capacity.
    #[must_use]
    pub const fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the candidate extraction granularity.
    #[must_use]
    pub const fn granularity(mut self, granularity: ScanGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Sets (or clears) the live-byte limit.
    #[must_use]
    pub const fn heap_limit(mut self, limit: Option<usize>) -> Self {
        self.heap_limit = limit;
        self
    }

    /// Sets the platform root bounds.
    #[must_use]
    pub fn roots(mut self, roots: RootBounds) -> Self {
        self.roots = roots;
        self
    }

    /// Returns `true` if the `count`-th allocation call should collect first.
    #[inline]
    #[must_use]
    pub const fn interval_due(&self, count: usize) -> bool {
        self.collect_interval != 0 && count % self.collect_interval == 0
    }
}
