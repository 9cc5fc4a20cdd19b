//! Stack and data-segment scanning through the thread-local heap.
//!
//! These rely on the platform reporting stack and data-segment bounds, so
//! they only run where `sys_alloc` can discover both.

#![cfg(all(target_os = "linux", target_env = "gnu", not(miri)))]

use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};

use conserve_gc::{allocate, collect, deallocate, list_live_allocations, with_collector};

static KEEP: AtomicUsize = AtomicUsize::new(0);

fn is_live(addr: usize) -> bool {
    list_live_allocations().iter().any(|l| l.address == addr)
}

#[test]
fn test_platform_roots_are_detected() {
    with_collector(|gc| {
        let roots = &gc.config().roots;
        assert!(roots.stack_bottom().is_some());
        assert!(roots.data_segment().is_some());
    });
}

#[test]
fn test_static_reference_survives() {
    let block = allocate(48).unwrap();
    KEEP.store(block.as_ptr() as usize, Ordering::SeqCst);

    collect();

    assert!(is_live(KEEP.load(Ordering::SeqCst)));
    deallocate(block.as_ptr());
}

#[test]
fn test_stack_reference_survives() {
    let block = allocate(48).unwrap();
    let addr = block.as_ptr() as usize;
    black_box(&addr);

    collect();

    assert!(is_live(addr));
    black_box(&addr);
    deallocate(block.as_ptr());
}

#[test]
fn test_reference_held_only_in_block_survives() {
    let x = allocate(16).unwrap();
    let y = allocate(16).unwrap();
    unsafe { y.as_ptr().cast::<usize>().write(x.as_ptr() as usize) };
    let x_addr = x.as_ptr() as usize;
    let y_addr = y.as_ptr() as usize;
    black_box(&y_addr);

    collect();

    assert!(is_live(y_addr));
    assert!(is_live(x_addr));
    black_box(&y_addr);
}

#[test]
fn test_collection_reports_root_regions() {
    collect();
    let metrics = conserve_gc::last_gc_metrics();
    // Register spill area, stack, data segment.
    assert_eq!(metrics.root_regions, 3);
    assert!(metrics.bytes_scanned > 0);
}

#[test]
fn test_explicit_stack_bottom() {
    let marker = 0u8;
    black_box(&marker);
    unsafe { conserve_gc::set_stack_bottom(std::ptr::addr_of!(marker)) };
    with_collector(|gc| {
        assert_eq!(
            gc.config().roots.stack_bottom(),
            Some(std::ptr::addr_of!(marker) as usize)
        );
    });

    unsafe { conserve_gc::set_stack_bottom(std::ptr::null()) };
    with_collector(|gc| assert_eq!(gc.config().roots.stack_bottom(), None));
}

#[cfg(feature = "test-util")]
const HIDE: usize = usize::MAX / 0xff * 0xa5;

/// Allocate a block and return its address scrambled, so the caller's frame
/// never holds the real address.
#[cfg(feature = "test-util")]
#[inline(never)]
fn allocate_hidden() -> usize {
    let block = allocate(64).unwrap();
    block.as_ptr() as usize ^ HIDE
}

/// Overwrite dead frames below the current one.
#[cfg(feature = "test-util")]
#[inline(never)]
fn scrub_stack() {
    let scratch = [0u8; 16 * 1024];
    black_box(&scratch);
}

#[cfg(feature = "test-util")]
#[test]
fn test_unreferenced_block_is_reclaimed() {
    let hidden = allocate_hidden();
    scrub_stack();
    unsafe { conserve_gc::test_util::clear_registers() };

    collect();

    assert!(!is_live(hidden ^ HIDE));
}
