// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Top-level error type for the shim.
//!
//! Every failure that can stop the virtual file from coming up is one of
//! these. Only `shim::fatal` turns one into process termination.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::locator::LocateError;
use crate::registry::InstallError;
use crate::vfile::ContractViolation;

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Locate failed: {0}")]
    Locate(#[from] LocateError),

    #[error("Symbol install failed: {0}")]
    Install(#[from] InstallError),

    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("Cannot open container {path}: {source}")]
    ContainerOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ShimError {
    /// Short machine-readable category, used as a log field.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Locate(_) => "locate",
            Self::Install(_) => "install",
            Self::Contract(_) => "contract",
            Self::ContainerOpen { .. } => "container_open",
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Contract(_))
    }
}
