// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page alignment math.
//!
//! Everything here is pure arithmetic so it can be exercised without issuing
//! a single syscall.

/// Split of a physical offset into its page-aligned base and the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// `offset` rounded down to a page boundary.
    pub aligned_offset: u64,
    /// `offset - aligned_offset`, always `< page_size`.
    pub remainder: u64,
}

/// Compute the page-aligned base and remainder of `offset`.
///
/// `page_size` must be a non-zero power of two.
pub fn compute_alignment(offset: u64, page_size: u64) -> Alignment {
    debug_assert!(page_size.is_power_of_two());
    let remainder = offset & (page_size - 1);
    Alignment {
        aligned_offset: offset - remainder,
        remainder,
    }
}

/// Round `addr` down to the start of its page.
pub fn page_floor(addr: usize, page_size: usize) -> usize {
    addr & !(page_size - 1)
}

/// Page size of the running system.
pub fn os_page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_offset_has_zero_remainder() {
        let a = compute_alignment(16384 * 3, 16384);
        assert_eq!(a.aligned_offset, 16384 * 3);
        assert_eq!(a.remainder, 0);
    }

    #[test]
    fn test_unaligned_offset_on_16k_pages() {
        let a = compute_alignment(999_000, 16384);
        assert_eq!(a.remainder, 999_000 % 16384);
        assert_eq!(a.aligned_offset, 999_000 - 999_000 % 16384);
        assert_eq!(a.aligned_offset % 16384, 0);
    }

    #[test]
    fn test_alignment_reconstructs_offset() {
        for page in [4096u64, 16384, 65536] {
            for offset in [0u64, 1, page - 1, page, page + 1, 123_456_789, u64::MAX / 2] {
                let a = compute_alignment(offset, page);
                assert_eq!(a.aligned_offset + a.remainder, offset);
                assert!(a.remainder < page);
                assert_eq!(a.aligned_offset % page, 0);
            }
        }
    }

    #[test]
    fn test_page_floor() {
        assert_eq!(page_floor(4097, 4096), 4096);
        assert_eq!(page_floor(8192, 4096), 8192);
        assert_eq!(page_floor(0, 4096), 0);
    }

    #[test]
    fn test_os_page_size_is_power_of_two() {
        assert!(os_page_size().is_power_of_two());
    }
}
