//! Low-level platform primitives for the conservative collector.
//!
//! The collector never talks to the operating system directly. Everything it
//! needs from the platform lives here:
//!
//! - a raw, explicit-free allocator ([`RawAlloc`], [`Malloc`])
//! - the bounds of the calling thread's stack ([`stack_bounds`])
//! - the bounds of the static data segment ([`data_segment`])

use std::ops::Range;
use std::ptr::NonNull;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

/// A raw memory allocator with explicit release.
///
/// Implementations hand out blocks that stay valid until passed back to
/// [`RawAlloc::deallocate`]. Blocks returned by distinct live allocations
/// must never overlap.
pub trait RawAlloc {
    /// Request `size` bytes. Returns `None` when the allocator is exhausted.
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the
    /// same `size`, and must not have been released already.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize);
}

impl<A: RawAlloc + ?Sized> RawAlloc for Box<A> {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        unsafe { (**self).deallocate(ptr, size) }
    }
}

/// The C library allocator (`malloc`/`free`, or the process heap on Windows).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Malloc;

impl RawAlloc for Malloc {
    #[inline]
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        os::malloc(size)
    }

    #[inline]
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, _size: usize) {
        unsafe { os::free(ptr) }
    }
}

/// Bounds of a thread's stack.
///
/// Stacks grow downwards on every supported platform, so `bottom` is the
/// highest address and `top` the lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBounds {
    /// The bottom of the stack (highest address, exclusive).
    pub bottom: usize,
    /// The top of the stack (lowest address).
    pub top: usize,
}

impl StackBounds {
    /// Returns `true` if `addr` lies inside the stack.
    #[must_use]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.top && addr < self.bottom
    }

    /// Size of the stack reservation in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }

    /// Returns `true` if the bounds describe an empty range.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Retrieve the stack bounds for the current thread.
///
/// Returns `None` when the platform gives no way to ask (or under Miri,
/// which does not model the native stack).
#[must_use]
pub fn stack_bounds() -> Option<StackBounds> {
    #[cfg(miri)]
    {
        None
    }
    #[cfg(not(miri))]
    {
        os::stack_bounds()
    }
}

/// Bounds of the process's static data segment (`.data` and `.bss`).
///
/// Only available where the linker exports the segment symbols; `None`
/// elsewhere.
#[must_use]
pub fn data_segment() -> Option<Range<usize>> {
    #[cfg(miri)]
    {
        None
    }
    #[cfg(not(miri))]
    {
        os::data_segment().filter(|range| range.start < range.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn test_malloc_roundtrip() {
        let mut raw = Malloc;
        let block = raw.allocate(64).expect("malloc failed");

        unsafe {
            ptr::write_bytes(block.as_ptr(), 0xAB, 64);
            assert_eq!(ptr::read_volatile(block.as_ptr().add(63)), 0xAB);
            raw.deallocate(block, 64);
        }
    }

    #[test]
    fn test_distinct_blocks_do_not_overlap() {
        let mut raw = Malloc;
        let a = raw.allocate(32).expect("malloc failed");
        let b = raw.allocate(32).expect("malloc failed");

        let (a_start, b_start) = (a.as_ptr() as usize, b.as_ptr() as usize);
        assert!(a_start + 32 <= b_start || b_start + 32 <= a_start);

        unsafe {
            raw.deallocate(a, 32);
            raw.deallocate(b, 32);
        }
    }

    #[cfg(all(any(target_os = "linux", windows), not(miri)))]
    #[test]
    fn test_stack_bounds_contain_local() {
        let local = 7usize;
        let addr = ptr::addr_of!(local) as usize;
        let bounds = stack_bounds().expect("stack bounds unavailable");

        assert!(bounds.contains(addr), "{addr:#x} not in {bounds:?}");
        assert!(!bounds.is_empty());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu", not(miri)))]
    #[test]
    fn test_data_segment_contains_static() {
        use std::sync::atomic::AtomicUsize;

        static MARKER: AtomicUsize = AtomicUsize::new(0x5eed);
        let addr = ptr::addr_of!(MARKER) as usize;
        let segment = data_segment().expect("data segment unavailable");

        assert!(segment.contains(&addr), "{addr:#x} not in {segment:x?}");
    }
}
