// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Telemetry for the shim layer.
//!
//! Structured logging through `tracing`; output goes to stderr or a file,
//! never anywhere else.

mod logging;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::{ShimSpan, SpanExt};
