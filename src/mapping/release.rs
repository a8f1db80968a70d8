// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-level release bookkeeping for the virtual mapping.
//!
//! The caller unmaps in its own coordinates, which are shifted by the
//! alignment remainder against the real pages. A real page is only handed to
//! the kernel once every byte of it has been released by some `munmap`, so two
//! fragments that each cover half of a page release it together, and nothing
//! outside the caller's requests is ever unmapped.
//!
//! Everything here is allocation-free after [`ReleaseTracker::new`], so it can
//! run under the mapping lock without re-entering the allocator.

use super::{ActiveMapping, RealRange};

/// Released bytes of one real page: a prefix `[0, lo)` and a suffix
/// `[hi, page_size)`. The page is fully released once `lo >= hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageCover {
    lo: u32,
    hi: u32,
    unmapped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTracker {
    real_base: usize,
    caller_base: usize,
    caller_end: usize,
    page_size: usize,
    pages: Vec<PageCover>,
    resident: usize,
}

/// Page indices `[first, last)` touched by one release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub first: usize,
    pub last: usize,
}

impl ReleaseTracker {
    pub fn new(mapping: &ActiveMapping, page_size: usize) -> Self {
        let real_len = mapping.remainder() + mapping.len();
        let count = real_len.div_ceil(page_size);
        let page = PageCover {
            lo: 0,
            hi: page_size as u32,
            unmapped: false,
        };
        Self {
            real_base: mapping.real_base(),
            caller_base: mapping.caller_base(),
            caller_end: mapping.caller_base() + mapping.len(),
            page_size,
            pages: vec![page; count],
            resident: count,
        }
    }

    fn span_end(&self) -> usize {
        self.real_base + self.pages.len() * self.page_size
    }

    /// Real pages the kernel still maps for the virtual file.
    pub fn resident(&self) -> usize {
        self.resident
    }

    pub fn is_released(&self) -> bool {
        self.resident == 0
    }

    /// Whether `addr` is caller-visible and its page is still mapped.
    pub fn owns(&self, addr: usize) -> bool {
        if addr < self.caller_base || addr >= self.caller_end {
            return false;
        }
        let index = (addr - self.real_base) / self.page_size;
        self.pages.get(index).is_some_and(|p| !p.unmapped)
    }

    /// Record that the caller released `[addr, addr + len)`.
    ///
    /// A request starting at the caller base also releases the slack before
    /// it; one reaching the caller end also releases the tail of the last
    /// page.
    pub fn cover(&mut self, addr: usize, len: usize) -> Option<PageSpan> {
        let start = addr.max(self.caller_base);
        let end = addr.saturating_add(len).min(self.caller_end);
        if start >= end {
            return None;
        }
        let start = if start == self.caller_base { self.real_base } else { start };
        let end = if end == self.caller_end { self.span_end() } else { end };

        let first = (start - self.real_base) / self.page_size;
        let last = (end - self.real_base).div_ceil(self.page_size);
        for (index, page) in self.pages[first..last].iter_mut().enumerate() {
            let page_start = self.real_base + (first + index) * self.page_size;
            let lo = start.saturating_sub(page_start) as u32;
            let hi = (end - page_start).min(self.page_size) as u32;
            if lo <= page.lo {
                page.lo = page.lo.max(hi);
            }
            if hi >= page.hi {
                page.hi = page.hi.min(lo);
            }
        }
        Some(PageSpan { first, last })
    }

    /// Take the next run of fully released pages in `span` that the kernel
    /// still maps, marking them unmapped.
    ///
    /// A run ending on the last page stops at the mapping end; the kernel
    /// rounds that up to its own page, which may be smaller than ours.
    pub fn take_run(&mut self, span: &mut PageSpan) -> Option<RealRange> {
        let ready = |p: &PageCover| !p.unmapped && p.lo >= p.hi;
        let offset = self.pages[span.first..span.last].iter().position(ready)?;
        let start = span.first + offset;
        let run = self.pages[start..span.last]
            .iter()
            .take_while(|p| ready(*p))
            .count();
        for page in &mut self.pages[start..start + run] {
            page.unmapped = true;
        }
        self.resident -= run;
        span.first = start + run;
        let addr = self.real_base + start * self.page_size;
        let end = (self.real_base + (start + run) * self.page_size).min(self.caller_end);
        Some(RealRange {
            addr,
            len: end - addr,
        })
    }
}
