//! Conservative stack scanning for root tracking.
//!
//! A mutator may hold the only reference to an allocation in a callee-saved
//! register rather than in a stack slot. Before the stack is read, those
//! registers are spilled into a local array and that array is scanned as its
//! own root region, followed by the live stack from the current frame up to
//! the recorded stack bottom.

use std::hint::black_box;
use std::mem::size_of_val;
use std::sync::atomic::{compiler_fence, Ordering};

#[cfg(all(target_arch = "x86_64", not(miri)))]
const SPILL_SLOTS: usize = 6;
#[cfg(all(target_arch = "aarch64", not(miri)))]
const SPILL_SLOTS: usize = 11;
#[cfg(any(not(any(target_arch = "x86_64", target_arch = "aarch64")), miri))]
const SPILL_SLOTS: usize = 32;

/// Spill callee-saved registers, then hand the register spill area and the
/// live stack to `scan_fn` as `(base, len)` regions.
///
/// Stacks are assumed to grow downwards, so the live stack is
/// `[current frame, stack_bottom)`. If the current frame is not below
/// `stack_bottom` (a bottom recorded for another thread, say) only the
/// spilled registers are reported.
///
/// # Safety
///
/// `stack_bottom` must be the bottom of the calling thread's stack (or an
/// address inside it above the current frame), so that every byte between
/// the current frame and it is mapped.
#[inline(never)]
pub unsafe fn spill_registers_and_scan<F>(stack_bottom: usize, mut scan_fn: F)
where
    F: FnMut(*const u8, usize),
{
    #[allow(unused_mut)]
    let mut regs = [0usize; SPILL_SLOTS];

    #[cfg(all(target_arch = "x86_64", not(miri)))]
    unsafe {
        std::arch::asm!(
            "mov {0}, rbx",
            "mov {1}, rbp",
            "mov {2}, r12",
            "mov {3}, r13",
            "mov {4}, r14",
            "mov {5}, r15",
            out(reg) regs[0],
            out(reg) regs[1],
            out(reg) regs[2],
            out(reg) regs[3],
            out(reg) regs[4],
            out(reg) regs[5],
            options(nomem, nostack, preserves_flags),
        );
    }

    #[cfg(all(target_arch = "aarch64", not(miri)))]
    unsafe {
        std::arch::asm!(
            "mov {0}, x19",
            "mov {1}, x20",
            "mov {2}, x21",
            "mov {3}, x22",
            "mov {4}, x23",
            "mov {5}, x24",
            "mov {6}, x25",
            "mov {7}, x26",
            "mov {8}, x27",
            "mov {9}, x28",
            "mov {10}, x29",
            out(reg) regs[0],
            out(reg) regs[1],
            out(reg) regs[2],
            out(reg) regs[3],
            out(reg) regs[4],
            out(reg) regs[5],
            out(reg) regs[6],
            out(reg) regs[7],
            out(reg) regs[8],
            out(reg) regs[9],
            out(reg) regs[10],
            options(nomem, nostack, preserves_flags),
        );
    }

    // The spill array must really live in memory, and no load or store of
    // the mutator's locals may be moved past this point.
    black_box(&regs);
    compiler_fence(Ordering::SeqCst);

    scan_fn(regs.as_ptr().cast::<u8>(), size_of_val(&regs));

    // The current stack pointer is approximately the address of a local.
    let frame_marker = 0usize;
    black_box(&frame_marker);
    let sp = std::ptr::addr_of!(frame_marker) as usize;

    if sp < stack_bottom {
        let base = std::ptr::with_exposed_provenance::<u8>(sp);
        scan_fn(base, stack_bottom - sp);
    }

    black_box(&regs);
}

/// Clear callee-saved registers so stale values left by earlier calls are not
/// picked up as roots.
///
/// # Safety
///
/// The callee-saved registers must not hold values the caller still needs.
#[cfg(any(test, feature = "test-util"))]
#[inline(never)]
pub unsafe fn clear_registers() {
    #[cfg(all(target_arch = "x86_64", not(miri)))]
    unsafe {
        // RBX and RBP are left alone: LLVM may reserve RBX and RBP can be the
        // frame pointer.
        std::arch::asm!(
            "xor r12, r12",
            "xor r13, r13",
            "xor r14, r14",
            "xor r15, r15",
            out("r12") _,
            out("r13") _,
            out("r14") _,
            out("r15") _,
        );
    }
    #[cfg(any(not(target_arch = "x86_64"), miri))]
    black_box(());
}

#[cfg(all(test, not(miri)))]
mod tests {
    use super::*;

    #[test]
    fn test_scans_registers_then_stack() {
        let bounds = match sys_alloc::stack_bounds() {
            Some(bounds) => bounds,
            None => return,
        };

        let mut regions = Vec::new();
        unsafe {
            spill_registers_and_scan(bounds.bottom, |base, len| regions.push((base as usize, len)));
        }

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].1, SPILL_SLOTS * std::mem::size_of::<usize>());
        let (stack_base, stack_len) = regions[1];
        assert!(bounds.contains(stack_base));
        assert_eq!(stack_base + stack_len, bounds.bottom);
    }

    #[test]
    fn test_stack_scan_sees_caller_local() {
        let bounds = match sys_alloc::stack_bounds() {
            Some(bounds) => bounds,
            None => return,
        };

        let needle: usize = 0x5eed_cafe_f00d;
        black_box(&needle);
        let needle_addr = std::ptr::addr_of!(needle) as usize;

        let mut covered = false;
        unsafe {
            spill_registers_and_scan(bounds.bottom, |base, len| {
                let base = base as usize;
                covered |= needle_addr >= base && needle_addr < base + len;
            });
        }
        assert!(covered);
    }

    #[test]
    fn test_bottom_below_frame_reports_registers_only() {
        let mut regions = 0;
        unsafe { spill_registers_and_scan(0, |_, _| regions += 1) };
        assert_eq!(regions, 1);
    }
}
