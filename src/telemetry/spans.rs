// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Span utilities for the shim layer.

use std::path::Path;

use tracing::{info_span, Span};

/// Extension trait for recording outcomes on spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for standardized shim spans.
pub struct ShimSpan;

impl ShimSpan {
    /// Span covering construction of the virtual file.
    ///
    /// `status` and `error.message` are filled in by `SpanExt::record_result`.
    pub fn open(container: &Path, lower: u64, len: u64) -> Span {
        info_span!(
            "vfile_open",
            container = %container.display(),
            lower,
            len,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }

    /// Span covering the one real mapping of the blob.
    pub fn mmap(len: usize, page_size: u64, alignment_offset: u64) -> Span {
        info_span!(
            "vfile_mmap",
            len,
            page_size,
            alignment_offset,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }

    /// Span covering locator work at startup.
    pub fn locate(container: &Path, search_bound: u64) -> Span {
        info_span!(
            "vfile_locate",
            container = %container.display(),
            search_bound,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
