// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! blobshim
//!
//! Presents a weight blob stored uncompressed inside a container archive as
//! an ordinary standalone file, without extracting it. An inference engine
//! that only knows how to `fopen` and `mmap` a model path is pointed at a
//! sentinel path; the stdio and mmap calls it makes on that path are served
//! from the embedded byte range of the container, and everything else is
//! passed through untouched.
//!
//! # Layout
//!
//! - [`locator`]: find the blob inside the container.
//! - [`vfile`]: the virtual file and its logical/physical translation.
//! - [`mapping`]: page alignment and companion-call address correction.
//! - [`registry`]: original implementations of the intercepted symbols.
//! - [`dispatch`]: "is this call about the virtual file?"
//! - `shim` (feature `preload`): the exported C entry points.
//!
//! # Building the preload library
//!
//! ```text
//! cargo build --release --features preload
//! LD_PRELOAD=target/release/libblobshim.so \
//!     BLOBSHIM_CONTAINER_PATH=/data/app/base.apk \
//!     BLOBSHIM_NEEDLE_PATH=/data/local/tmp/model.bin \
//!     ./engine /.blobshim/embedded-model.bin
//! ```

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod locator;
pub mod mapping;
pub mod registry;
pub mod telemetry;
pub mod vfile;

mod errno;

#[cfg(feature = "preload")]
pub mod shim;

pub use config::{ConfigError, EffectiveConfig, EnvConfig};
pub use dispatch::{Dispatcher, Route, VirtualTarget};
pub use error::ShimError;
pub use locator::{locate, locate_files, locate_with, LocateError, LocateOptions, MatchPolicy};
pub use mapping::{compute_alignment, ActiveMapping, Alignment};
pub use registry::{DlsymResolver, InstallError, Originals, RealIo, Registry, StaticResolver, SymbolResolver};
pub use vfile::{
    Companion, ContractViolation, EmbeddedRange, Lifecycle, LifecycleState, VirtualFile,
    SENTINEL_FD,
};
