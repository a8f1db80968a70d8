// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Memory-map translation for the virtual file.
//!
//! The embedded range rarely starts on a page boundary, so the real mapping
//! has to begin at the page containing `lower` and the caller receives an
//! address shifted forward by the remainder:
//!
//! ```text
//!  real_base            caller_base = real_base + remainder
//!  |<-- remainder -->|<------------- length ------------->|
//!  [  container slack | logical offset 0 ... length - 1   ]
//! ```
//!
//! Companion calls (`madvise`, `munmap`, `mlock`, `munlock`) made against
//! `caller_base` must reach the kernel with the page-aligned `real_base`.
//! `munmap` additionally goes through [`ReleaseTracker`], so fragments only
//! ever unmap whole pages the caller has fully released.

mod align;
mod release;

pub use align::{compute_alignment, os_page_size, page_floor, Alignment};
pub use release::{PageSpan, ReleaseTracker};

/// Physical parameters for the real `mmap` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    /// Page-aligned container offset passed to the real `mmap`.
    pub aligned_offset: u64,
    /// Length of the real mapping (`length + remainder`).
    pub real_length: usize,
    /// Bytes between the real base and logical offset 0.
    pub remainder: usize,
}

/// Plan the real mapping that exposes `length` logical bytes starting at
/// container offset `physical_offset`.
///
/// Returns `None` when the padded length does not fit in `usize`.
pub fn plan_mapping(physical_offset: u64, length: usize, page_size: u64) -> Option<MapRequest> {
    let alignment = compute_alignment(physical_offset, page_size);
    let remainder = usize::try_from(alignment.remainder).ok()?;
    let real_length = length.checked_add(remainder)?;
    Some(MapRequest {
        aligned_offset: alignment.aligned_offset,
        real_length,
        remainder,
    })
}

/// Address range handed to the real syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealRange {
    pub addr: usize,
    pub len: usize,
}

impl RealRange {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The one outstanding mapping owned by the virtual file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveMapping {
    real_base: usize,
    remainder: usize,
    length: usize,
    page_size: usize,
}

impl ActiveMapping {
    /// Record a mapping returned by the real `mmap` for `request`.
    pub fn new(real_base: usize, request: &MapRequest, page_size: usize) -> Self {
        Self {
            real_base,
            remainder: request.remainder,
            length: request.real_length - request.remainder,
            page_size,
        }
    }

    /// Address at which logical offset 0 appears.
    pub fn caller_base(&self) -> usize {
        self.real_base + self.remainder
    }

    /// Page-aligned base returned by the real `mmap`.
    pub fn real_base(&self) -> usize {
        self.real_base
    }

    /// Caller-visible length.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn remainder(&self) -> usize {
        self.remainder
    }

    fn caller_end(&self) -> usize {
        self.caller_base() + self.length
    }

    /// Whether `addr` lies inside `[caller_base, caller_base + len)`.
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.caller_base() && addr < self.caller_end()
    }

    /// Translate a caller range that starts inside this mapping into the
    /// page-aligned range `madvise`, `mlock` and `munlock` must receive.
    ///
    /// A range starting at `caller_base` starts at `real_base`, since the slack
    /// before logical offset 0 belongs to this mapping too. Interior addresses
    /// round down to their page. The end is clamped to the mapping.
    pub fn translate(&self, addr: usize, len: usize) -> RealRange {
        debug_assert!(self.contains(addr));
        let end = addr.saturating_add(len).min(self.caller_end());
        let start = if addr == self.caller_base() {
            self.real_base
        } else {
            page_floor(addr, self.page_size)
        };
        RealRange {
            addr: start,
            len: end.saturating_sub(start),
        }
    }
}
