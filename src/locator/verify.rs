// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! SHA-256 verification of a located range.

use sha2::{Digest, Sha256};

use super::LocateError;
use crate::vfile::EmbeddedRange;

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Check that `range` of `container` hashes to `expected` (hex, case-insensitive).
pub fn verify_range_sha256(
    container: &[u8],
    range: &EmbeddedRange,
    expected: &str,
) -> Result<(), LocateError> {
    let bytes = container
        .get(range.lower() as usize..range.upper() as usize)
        .ok_or(LocateError::Overrun {
            offset: range.lower(),
            blob_len: range.len(),
            container_len: container.len() as u64,
        })?;
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        tracing::debug!(digest = %actual, "Embedded range digest verified");
        Ok(())
    } else {
        Err(LocateError::DigestMismatch {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}
