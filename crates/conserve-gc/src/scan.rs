//! Candidate pointer extraction from untyped memory.
//!
//! The collector knows nothing about the types stored in the memory it
//! scans. Every pointer-sized window is read as an address and handed to the
//! registry; whatever resolves to a live allocation is treated as a
//! reference. Integers that happen to look like heap addresses therefore keep
//! memory alive (false retention). That imprecision is inherent to
//! conservative collection and is accepted here.

use std::mem::size_of;

const WORD: usize = size_of::<usize>();

/// How candidate addresses are pulled out of a scanned region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanGranularity {
    /// Read a pointer-sized value at every byte offset. Finds pointers stored
    /// at any alignment (packed structs, byte buffers) at the cost of
    /// `size_of::<usize>()` times more lookups.
    #[default]
    Byte,
    /// Read only pointer-aligned words.
    Word,
}

impl ScanGranularity {
    /// Distance between consecutive candidate offsets.
    #[inline]
    #[must_use]
    pub const fn step(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => WORD,
        }
    }

    /// Iterate over every candidate address in `[base, base + len)`.
    ///
    /// Regions shorter than a pointer yield nothing.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of `len` bytes for as long as the
    /// returned iterator is used.
    #[must_use]
    pub unsafe fn candidates(self, base: *const u8, len: usize) -> Candidates {
        if base.is_null() || len < WORD {
            return Candidates::empty();
        }

        let offset = match self {
            Self::Byte => 0,
            Self::Word => {
                let misalign = (base as usize) % WORD;
                if misalign == 0 {
                    0
                } else {
                    WORD - misalign
                }
            }
        };

        Candidates {
            base,
            offset,
            last: len - WORD,
            step: self.step(),
        }
    }
}

/// Iterator over candidate addresses in a region.
#[derive(Debug)]
pub struct Candidates {
    base: *const u8,
    offset: usize,
    last: usize,
    step: usize,
}

impl Candidates {
    const fn empty() -> Self {
        Self {
            base: std::ptr::null(),
            offset: 1,
            last: 0,
            step: 1,
        }
    }
}

impl Iterator for Candidates {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.offset > self.last {
            return None;
        }
        // SAFETY: offset + WORD <= len, and the caller of `candidates`
        // guaranteed the region is readable.
        let value = unsafe { self.base.add(self.offset).cast::<usize>().read_unaligned() };
        self.offset += self.step;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.offset > self.last {
            0
        } else {
            (self.last - self.offset) / self.step + 1
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Candidates {}
