use std::ops::Range;
use std::ptr::NonNull;

#[cfg(not(miri))]
use windows_sys::Win32::System::Memory::{GetProcessHeap, HeapAlloc, HeapFree};
#[cfg(not(miri))]
use windows_sys::Win32::System::Threading::GetCurrentThreadStackLimits;

use crate::StackBounds;

#[inline]
pub fn malloc(size: usize) -> Option<NonNull<u8>> {
    #[cfg(miri)]
    {
        // SAFETY: malloc has no preconditions.
        let ptr = unsafe { libc::malloc(size) };
        NonNull::new(ptr.cast::<u8>())
    }
    #[cfg(not(miri))]
    {
        // SAFETY: the process heap handle is valid for the process lifetime.
        let ptr = unsafe { HeapAlloc(GetProcessHeap(), 0, size) };
        NonNull::new(ptr.cast::<u8>())
    }
}

#[inline]
pub unsafe fn free(ptr: NonNull<u8>) {
    #[cfg(miri)]
    unsafe {
        libc::free(ptr.as_ptr().cast());
    }
    #[cfg(not(miri))]
    unsafe {
        HeapFree(GetProcessHeap(), 0, ptr.as_ptr().cast_const().cast());
    }
}

#[cfg(not(miri))]
pub fn stack_bounds() -> Option<StackBounds> {
    let mut low: usize = 0;
    let mut high: usize = 0;
    unsafe { GetCurrentThreadStackLimits(&mut low, &mut high) };
    if high <= low {
        return None;
    }
    Some(StackBounds {
        bottom: high,
        top: low,
    })
}

#[cfg(miri)]
pub const fn stack_bounds() -> Option<StackBounds> {
    None
}

/// PE images do not export a single writable-data range the way ELF linkers
/// do; callers register static roots explicitly instead.
pub const fn data_segment() -> Option<Range<usize>> {
    None
}
