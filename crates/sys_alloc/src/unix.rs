use std::ops::Range;
use std::ptr::NonNull;

use crate::StackBounds;

#[inline]
pub fn malloc(size: usize) -> Option<NonNull<u8>> {
    // SAFETY: malloc has no preconditions; a null result means exhaustion.
    let ptr = unsafe { libc::malloc(size) };
    NonNull::new(ptr.cast::<u8>())
}

#[inline]
pub unsafe fn free(ptr: NonNull<u8>) {
    unsafe { libc::free(ptr.as_ptr().cast::<libc::c_void>()) }
}

#[cfg(target_os = "linux")]
pub fn stack_bounds() -> Option<StackBounds> {
    use libc::{
        pthread_attr_destroy, pthread_attr_getstack, pthread_attr_t, pthread_getattr_np,
        pthread_self,
    };

    unsafe {
        let mut attr: pthread_attr_t = std::mem::zeroed();
        if pthread_getattr_np(pthread_self(), &raw mut attr) != 0 {
            return None;
        }

        let mut stackaddr: *mut libc::c_void = std::ptr::null_mut();
        let mut stacksize: libc::size_t = 0;
        let ret = pthread_attr_getstack(&raw const attr, &raw mut stackaddr, &raw mut stacksize);
        pthread_attr_destroy(&raw mut attr);
        if ret != 0 {
            return None;
        }

        let top = stackaddr as usize;
        Some(StackBounds {
            bottom: top + stacksize,
            top,
        })
    }
}

#[cfg(target_vendor = "apple")]
pub fn stack_bounds() -> Option<StackBounds> {
    unsafe {
        let thread = libc::pthread_self();
        // On Darwin the reported address is the high end of the stack.
        let bottom = libc::pthread_get_stackaddr_np(thread) as usize;
        let size = libc::pthread_get_stacksize_np(thread);
        Some(StackBounds {
            bottom,
            top: bottom.saturating_sub(size),
        })
    }
}

#[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
pub const fn stack_bounds() -> Option<StackBounds> {
    None
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn data_segment() -> Option<Range<usize>> {
    // `__data_start` comes from the C runtime's start files and `_end` from
    // the linker; together they span `.data` and `.bss`.
    extern "C" {
        static __data_start: u8;
        static _end: u8;
    }

    let start = std::ptr::addr_of!(__data_start) as usize;
    let end = std::ptr::addr_of!(_end) as usize;
    Some(start..end)
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub const fn data_segment() -> Option<Range<usize>> {
    None
}
