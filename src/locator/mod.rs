// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Byte-range locator.
//!
//! Finds where the weight blob sits inside the container. There is no index:
//! candidates come from an Aho-Corasick scan for a head prefix of the needle
//! over a bounded window, and each candidate is validated before it is
//! accepted so that a coincidental early copy of the head is never returned.

mod verify;

use std::fs::File;
use std::path::{Path, PathBuf};

use aho_corasick::AhoCorasick;
use memmap2::Mmap;
use thiserror::Error;

use crate::vfile::EmbeddedRange;

pub use verify::{sha256_hex, verify_range_sha256};

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Needle is empty")]
    EmptyNeedle,

    #[error("Blob not found within the first {search_bound} bytes of a {container_len}-byte container")]
    NotFound { search_bound: u64, container_len: u64 },

    #[error("Blob head matches at offsets {first} and {second}; prefix is not unique")]
    Ambiguous { first: u64, second: u64 },

    #[error("Blob of {blob_len} bytes at offset {offset} overruns container of {container_len} bytes")]
    Overrun {
        offset: u64,
        blob_len: u64,
        container_len: u64,
    },

    #[error("Digest mismatch for embedded range: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Failed to build matcher: {0}")]
    Matcher(String),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a candidate occurrence is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Every byte of the needle must match.
    #[default]
    Full,
    /// Head and tail probes plus total length must match, and the accepted
    /// occurrence must be the only one inside the window.
    Prefix,
}

impl MatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Prefix => "prefix",
        }
    }
}

impl std::str::FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "prefix" => Ok(Self::Prefix),
            other => Err(format!("unknown match policy: {}", other)),
        }
    }
}

/// Locator tuning.
#[derive(Debug, Clone)]
pub struct LocateOptions {
    /// Only occurrences starting inside `[0, search_bound)` are considered.
    pub search_bound: u64,
    /// Length of the head (and tail) probe.
    pub head_len: usize,
    pub policy: MatchPolicy,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            search_bound: 256 * 1024 * 1024,
            head_len: 64 * 1024,
            policy: MatchPolicy::Full,
        }
    }
}

/// Offset of the first exact occurrence of `needle` that starts within the
/// first `search_bound` bytes of `container`.
pub fn locate(container: &[u8], needle: &[u8], search_bound: u64) -> Result<u64, LocateError> {
    let options = LocateOptions {
        search_bound,
        head_len: needle.len().min(LocateOptions::default().head_len),
        policy: MatchPolicy::Full,
    };
    locate_with(container, needle, &options).map(|range| range.lower())
}

/// Locate `needle` inside `container` and return the validated range.
pub fn locate_with(
    container: &[u8],
    needle: &[u8],
    options: &LocateOptions,
) -> Result<EmbeddedRange, LocateError> {
    if needle.is_empty() {
        return Err(LocateError::EmptyNeedle);
    }

    let container_len = container.len() as u64;
    let blob_len = needle.len() as u64;
    let head_len = options.head_len.clamp(1, needle.len());
    let head = &needle[..head_len];

    // A head starting at bound - 1 still has to be fully visible.
    let window_end = options
        .search_bound
        .saturating_add(head_len as u64 - 1)
        .min(container_len) as usize;
    let window = &container[..window_end];

    let matcher = AhoCorasick::new([head]).map_err(|e| LocateError::Matcher(e.to_string()))?;

    let mut accepted: Option<u64> = None;
    let mut overrun: Option<u64> = None;

    for m in matcher.find_overlapping_iter(window) {
        let offset = m.start() as u64;
        if offset >= options.search_bound {
            break;
        }
        if offset + blob_len > container_len {
            overrun.get_or_insert(offset);
            continue;
        }
        let start = m.start();
        let candidate = &container[start..start + needle.len()];
        if !candidate_matches(candidate, needle, head_len, options.policy) {
            continue;
        }
        match (options.policy, accepted) {
            (MatchPolicy::Full, _) => {
                accepted = Some(offset);
                break;
            }
            (MatchPolicy::Prefix, None) => accepted = Some(offset),
            (MatchPolicy::Prefix, Some(first)) => {
                return Err(LocateError::Ambiguous {
                    first,
                    second: offset,
                });
            }
        }
    }

    match (accepted, overrun) {
        (Some(offset), _) => {
            tracing::debug!(offset, blob_len, policy = options.policy.as_str(), "Blob located");
            EmbeddedRange::new(offset, offset + blob_len, container_len).map_err(|_| {
                LocateError::Overrun {
                    offset,
                    blob_len,
                    container_len,
                }
            })
        }
        (None, Some(offset)) => Err(LocateError::Overrun {
            offset,
            blob_len,
            container_len,
        }),
        (None, None) => Err(LocateError::NotFound {
            search_bound: options.search_bound,
            container_len,
        }),
    }
}

fn candidate_matches(candidate: &[u8], needle: &[u8], head_len: usize, policy: MatchPolicy) -> bool {
    match policy {
        MatchPolicy::Full => candidate == needle,
        MatchPolicy::Prefix => {
            let tail_start = needle.len() - head_len;
            candidate[tail_start..] == needle[tail_start..]
        }
    }
}

/// Read-only memory map of a file on disk.
pub struct MappedBytes {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedBytes {
    pub fn open(path: &Path) -> Result<Self, LocateError> {
        let io_err = |source| LocateError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        // SAFETY: both the container and the needle asset are immutable for
        // the process lifetime.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Map the container and the needle asset and locate the blob.
pub fn locate_files(
    container_path: &Path,
    needle_path: &Path,
    options: &LocateOptions,
) -> Result<EmbeddedRange, LocateError> {
    let container = MappedBytes::open(container_path)?;
    let needle = MappedBytes::open(needle_path)?;
    tracing::info!(
        container = %container_path.display(),
        container_len = container.len(),
        blob_len = needle.len(),
        search_bound = options.search_bound,
        "Locating embedded blob"
    );
    locate_with(container.as_bytes(), needle.as_bytes(), options)
}
