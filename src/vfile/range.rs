// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Embedded byte range and logical/physical translation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid range [{lower}, {upper}) for container of {container_len} bytes")]
pub struct RangeError {
    pub lower: u64,
    pub upper: u64,
    pub container_len: u64,
}

/// `[lower, upper)` inside the container where the blob lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedRange {
    lower: u64,
    upper: u64,
}

impl EmbeddedRange {
    /// Requires `lower <= upper <= container_len`.
    pub fn new(lower: u64, upper: u64, container_len: u64) -> Result<Self, RangeError> {
        if lower > upper || upper > container_len {
            return Err(RangeError {
                lower,
                upper,
                container_len,
            });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> u64 {
        self.lower
    }

    pub fn upper(&self) -> u64 {
        self.upper
    }

    /// Blob size.
    pub fn len(&self) -> u64 {
        self.upper - self.lower
    }

    pub fn is_empty(&self) -> bool {
        self.lower == self.upper
    }

    /// Physical offset of `logical`, if `0 <= logical <= len`.
    ///
    /// `len` itself is accepted: seeking to end-of-file is legal.
    pub fn to_physical(&self, logical: i64) -> Option<u64> {
        let logical = u64::try_from(logical).ok()?;
        if logical > self.len() {
            return None;
        }
        Some(self.lower + logical)
    }

    /// Logical offset of a physical position; may be negative if the real
    /// cursor was pushed below `lower` by an unchecked relative seek.
    pub fn to_logical(&self, physical: i64) -> i64 {
        physical - self.lower as i64
    }
}
