//! The collector context: allocator front-end plus mark-sweep driver.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::time::Instant;

use sys_alloc::{Malloc, RawAlloc};

use crate::config::GcConfig;
use crate::error::GcError;
use crate::gc::{sweep, MarkStats, Marker};
use crate::metrics::{CollectTrigger, CollectorStats, GcMetrics, PhaseTimer};
use crate::registry::{Allocation, Registry};
use crate::roots::{RootRegion, RootSet};

#[cfg(feature = "tracing")]
use crate::tracing::internal::{
    log_out_of_memory, log_phase_end, log_phase_end_mark, log_phase_start, log_root_region,
    next_gc_id, trace_gc_collection, trace_phase, GcPhase,
};

/// One live allocation, as reported by
/// [`Collector::list_live_allocations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveAllocation {
    /// Address of the first byte.
    pub address: usize,
    /// Size in bytes.
    pub size: usize,
}

impl From<&Allocation> for LiveAllocation {
    fn from(alloc: &Allocation) -> Self {
        Self {
            address: alloc.start(),
            size: alloc.size(),
        }
    }
}

/// A conservative mark-sweep collector over a raw allocator.
///
/// The collector owns every block it hands out. Blocks are released either
/// explicitly ([`deallocate`](Self::deallocate)) or by a collection that
/// finds no pointer-shaped reference to them in the roots or in other
/// reachable blocks. Dropping the collector releases whatever is left.
///
/// Pointers returned by [`allocate`](Self::allocate) are plain raw pointers:
/// a collection may release a block whose only reference is stored
/// somewhere the collector does not scan (memory from another allocator,
/// an obfuscated value). Keep references in scanned memory, or register the
/// memory that holds them with
/// [`register_root_region`](Self::register_root_region).
///
/// A collector scans the stack of the thread that created its configuration,
/// so it is `!Send`.
#[derive(Debug)]
pub struct Collector<A: RawAlloc = Malloc> {
    raw: A,
    registry: Registry,
    config: GcConfig,
    roots: RootSet,
    allocation_count: usize,
    collecting: bool,
    last_metrics: GcMetrics,
    stats: CollectorStats,
    _not_send: PhantomData<*mut ()>,
}

impl Collector<Malloc> {
    /// A collector over `malloc` with the platform's roots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Malloc, GcConfig::detect())
    }
}

impl Default for Collector<Malloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAlloc> Collector<A> {
    /// Create a collector over `raw` with the given configuration.
    pub fn with_config(raw: A, config: GcConfig) -> Self {
        Self {
            raw,
            registry: Registry::with_capacity(config.initial_capacity),
            config,
            roots: RootSet::new(),
            allocation_count: 0,
            collecting: false,
            last_metrics: GcMetrics::new(),
            stats: CollectorStats::default(),
            _not_send: PhantomData,
        }
    }

    /// The active configuration.
    pub const fn config(&self) -> &GcConfig {
        &self.config
    }

    /// The underlying raw allocator.
    pub const fn raw_allocator(&self) -> &A {
        &self.raw
    }

    /// Record the bottom of the mutator's stack.
    ///
    /// # Safety
    ///
    /// Same contract as
    /// [`RootBounds::with_stack_bottom`](crate::RootBounds::with_stack_bottom):
    /// `bottom` must lie inside this thread's stack, above every frame that
    /// will be live when the collector runs.
    pub unsafe fn set_stack_bottom(&mut self, bottom: usize) {
        let roots = std::mem::take(&mut self.config.roots);
        // SAFETY: forwarded from the caller.
        self.config.roots = unsafe { roots.with_stack_bottom(bottom) };
    }

    /// Stop scanning the stack.
    pub fn clear_stack_bottom(&mut self) {
        let roots = std::mem::take(&mut self.config.roots);
        self.config.roots = roots.without_stack_bottom();
    }

    // ------------------------------------------------------------------
    // Allocator front-end
    // ------------------------------------------------------------------

    /// Allocate `size` zeroed bytes.
    ///
    /// Every call advances the allocation counter. When the counter reaches
    /// a multiple of the collection interval, a full collection runs before
    /// the raw request. When the raw allocator refuses the request, a
    /// collection runs (unless one just did) and the request is retried
    /// once.
    ///
    /// Zero-byte requests are served as one-byte blocks.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::OutOfMemory`] if the request cannot be satisfied
    /// after collecting.
    ///
    /// # Panics
    ///
    /// Panics if the raw allocator returns a block overlapping a live one.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, GcError> {
        let size = size.max(1);
        self.allocation_count = self.allocation_count.wrapping_add(1);
        self.stats.allocations += 1;

        let interval_due = self.config.interval_due(self.allocation_count);
        if interval_due {
            self.collect_with(CollectTrigger::Interval);
        }

        let block = match self.request_raw(size) {
            Some(block) => block,
            None if !interval_due => {
                self.collect_with(CollectTrigger::Exhausted);
                self.request_raw(size)
                    .ok_or_else(|| self.out_of_memory(size))?
            }
            None => return Err(self.out_of_memory(size)),
        };

        let start = block.as_ptr().expose_provenance();
        self.registry.insert(start, size);

        // SAFETY: the raw allocator just handed out `size` writable bytes.
        unsafe { ptr::write_bytes(block.as_ptr(), 0, size) };
        Ok(block)
    }

    fn request_raw(&mut self, size: usize) -> Option<NonNull<u8>> {
        if let Some(limit) = self.config.heap_limit {
            if self.registry.live_bytes().saturating_add(size) > limit {
                return None;
            }
        }
        self.raw.allocate(size)
    }

    fn out_of_memory(&mut self, requested: usize) -> GcError {
        self.stats.failed_allocations += 1;
        #[cfg(feature = "tracing")]
        log_out_of_memory(requested, self.registry.live_bytes());
        GcError::OutOfMemory { requested }
    }

    /// Release a block returned by [`allocate`](Self::allocate).
    ///
    /// A null pointer is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is not the start of a live allocation: an interior
    /// pointer, a foreign pointer, or a block already released.
    pub fn deallocate(&mut self, ptr: *mut u8) {
        if let Err(err) = self.try_deallocate(ptr) {
            panic!("{err}");
        }
    }

    /// Release a block, reporting an invalid address instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::InvalidRelease`] if `ptr` is non-null and not the
    /// start of a live allocation. Nothing is released in that case.
    pub fn try_deallocate(&mut self, ptr: *mut u8) -> Result<(), GcError> {
        let Some(block) = NonNull::new(ptr) else {
            return Ok(());
        };
        let alloc = self.registry.try_remove(block.as_ptr() as usize)?;
        self.stats.deallocations += 1;
        // SAFETY: the record owned this block and has just been removed.
        unsafe { self.raw.deallocate(block, alloc.size()) };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------

    /// Scan `[base, base + len)` for references on every collection.
    ///
    /// # Safety
    ///
    /// The region must stay readable until it is unregistered or the
    /// collector is dropped.
    pub unsafe fn register_root_region(&mut self, base: *const u8, len: usize) {
        self.roots.push(RootRegion::new(base.expose_provenance(), len));
    }

    /// Stop scanning the region registered at `base`. Returns whether it was
    /// registered.
    pub fn unregister_root_region(&mut self, base: *const u8) -> bool {
        self.roots.remove(base as usize)
    }

    /// Forget every registered root region.
    pub fn clear_root_regions(&mut self) {
        self.roots.clear();
    }

    /// Number of registered root regions.
    pub fn root_region_count(&self) -> usize {
        self.roots.len()
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Run a full mark-sweep cycle now.
    pub fn collect(&mut self) {
        self.collect_with(CollectTrigger::Explicit);
    }

    /// Returns `true` while a collection is running.
    pub const fn is_collecting(&self) -> bool {
        self.collecting
    }

    fn collect_with(&mut self, trigger: CollectTrigger) {
        if self.collecting {
            return;
        }
        self.collecting = true;

        #[cfg(feature = "tracing")]
        let _span = trace_gc_collection(trigger, next_gc_id());

        let start = Instant::now();
        let mut timer = PhaseTimer::new();

        // Phase 1: Clear all marks
        timer.start();
        #[cfg(feature = "tracing")]
        let clear_span = trace_phase(GcPhase::Clear);
        self.registry.clear_marks();
        #[cfg(feature = "tracing")]
        drop(clear_span);
        timer.end_clear();

        // Phase 2: Mark everything reachable from the roots
        timer.start();
        let mark = self.mark_phase();
        timer.end_mark();

        // Phase 3: Sweep unmarked allocations
        timer.start();
        #[cfg(feature = "tracing")]
        let sweep_span = trace_phase(GcPhase::Sweep);
        #[cfg(feature = "tracing")]
        log_phase_start(GcPhase::Sweep, self.registry.live_bytes());
        let swept = sweep(&mut self.registry, &mut self.raw);
        #[cfg(feature = "tracing")]
        log_phase_end(GcPhase::Sweep, swept.bytes_reclaimed);
        #[cfg(feature = "tracing")]
        drop(sweep_span);
        timer.end_sweep();

        let metrics = GcMetrics {
            duration: start.elapsed(),
            clear_duration: timer.clear,
            mark_duration: timer.mark,
            sweep_duration: timer.sweep,
            bytes_reclaimed: swept.bytes_reclaimed,
            bytes_surviving: swept.bytes_surviving,
            objects_reclaimed: swept.objects_reclaimed,
            objects_surviving: swept.objects_surviving,
            objects_marked: mark.objects_marked,
            bytes_scanned: mark.bytes_scanned,
            root_regions: mark.root_regions,
            worklist_peak: mark.worklist_peak,
            trigger,
            total_collections: self.stats.collections + 1,
        };
        self.stats.record(&metrics);
        self.last_metrics = metrics;
        self.collecting = false;
    }

    /// Scan the stack, the data segment and registered regions, then
    /// propagate through reachable allocations.
    fn mark_phase(&mut self) -> MarkStats {
        #[cfg(feature = "tracing")]
        let _span = trace_phase(GcPhase::Mark);
        #[cfg(feature = "tracing")]
        log_phase_start(GcPhase::Mark, self.registry.live_bytes());

        let roots = &self.config.roots;
        let mut marker = Marker::new(&mut self.registry, self.config.granularity);

        if let Some(bottom) = roots.stack_bottom() {
            // SAFETY: the stack bottom comes from the platform or from an
            // `unsafe` setter, for the thread that owns this collector, which
            // is `!Send`.
            unsafe {
                crate::stack::spill_registers_and_scan(bottom, |base, len| {
                    #[cfg(feature = "tracing")]
                    log_root_region("stack", base as usize, len);
                    marker.scan_root(base, len);
                });
            }
        }

        if let Some(segment) = roots.data_segment() {
            #[cfg(feature = "tracing")]
            log_root_region("data", segment.start, segment.len());
            let base = ptr::with_exposed_provenance::<u8>(segment.start);
            // SAFETY: the range was reported by the platform as mapped static
            // data, or vouched for by the caller of `with_data_segment`.
            unsafe { marker.scan_root(base, segment.len()) };
        }

        for region in self.roots.iter() {
            #[cfg(feature = "tracing")]
            log_root_region("registered", region.base(), region.len());
            let base = ptr::with_exposed_provenance::<u8>(region.base());
            // SAFETY: `register_root_region` requires the region to stay
            // readable while registered.
            unsafe { marker.scan_root(base, region.len()) };
        }

        let stats = marker.finish();
        #[cfg(feature = "tracing")]
        log_phase_end_mark(stats.objects_marked, stats.bytes_scanned);
        stats
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Snapshot of every live allocation, in address order.
    ///
    /// Does not touch reachability state.
    pub fn list_live_allocations(&self) -> Vec<LiveAllocation> {
        self.registry.iter().map(LiveAllocation::from).collect()
    }

    /// The live allocation containing `ptr` (interior pointers included).
    pub fn find_allocation(&self, ptr: *const u8) -> Option<LiveAllocation> {
        self.registry
            .find_containing(ptr as usize)
            .map(LiveAllocation::from)
    }

    /// Returns `true` if `ptr` points into a live allocation.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.find_allocation(ptr).is_some()
    }

    /// The allocation registry.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Bytes currently allocated.
    pub const fn heap_size(&self) -> usize {
        self.registry.live_bytes()
    }

    /// Number of live allocations.
    pub fn live_count(&self) -> usize {
        self.registry.len()
    }

    /// Calls to [`allocate`](Self::allocate) so far.
    pub const fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Metrics from the most recent collection.
    pub const fn last_metrics(&self) -> GcMetrics {
        self.last_metrics
    }

    /// Cumulative counters.
    pub const fn stats(&self) -> CollectorStats {
        self.stats
    }
}

impl<A: RawAlloc> Drop for Collector<A> {
    fn drop(&mut self) {
        let raw = &mut self.raw;
        self.registry.drain(|alloc| {
            if let Some(block) = NonNull::new(ptr::with_exposed_provenance_mut::<u8>(alloc.start())) {
                // SAFETY: the registry owned the block until this drain.
                unsafe { raw.deallocate(block, alloc.size()) };
            }
        });
    }
}
