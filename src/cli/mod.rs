// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for blobshim diagnostics.
//!
//! Everything the preload library does at startup can be run by hand from
//! here, against the same `BLOBSHIM_*` configuration, without preloading
//! anything into a process.
//!
//! ## Usage
//!
//! ```bash
//! blobshim-cli locate --container base.apk --needle model.bin
//! blobshim-cli verify --container base.apk --needle model.bin --sha256 <hex>
//! blobshim-cli probe                  # uses BLOBSHIM_* from the environment
//! blobshim-cli config show --json
//! ```

pub mod config_cmd;
pub mod locate_cmd;
pub mod probe_cmd;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{self, EnvConfig};
use crate::locator::MatchPolicy;

pub use locate_cmd::{run_locate, run_verify};
pub use probe_cmd::{run_probe, ProbeReport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("Unknown argument: {0}")]
    UnknownArgument(String),
}

/// Options shared by `locate`, `verify` and `probe`.
///
/// Starts from the environment configuration; flags override it.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub config: EnvConfig,
    pub json: bool,
}

impl CommandOptions {
    /// Parse `args` (everything after the subcommand name).
    pub fn parse(args: &[String]) -> Result<Self, CliError> {
        Self::parse_over(config::load(), args)
    }

    pub fn parse_over(mut config: EnvConfig, args: &[String]) -> Result<Self, CliError> {
        let mut json = false;
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            if flag == "--json" {
                json = true;
                i += 1;
                continue;
            }
            let value = args
                .get(i + 1)
                .ok_or_else(|| CliError::MissingValue(flag.to_string()))?;
            let invalid = || CliError::InvalidValue {
                flag: flag.to_string(),
                value: value.clone(),
            };
            match flag {
                "--container" => config.container_path = Some(PathBuf::from(value)),
                "--needle" => config.needle_path = Some(PathBuf::from(value)),
                "--sha256" => config.expected_sha256 = Some(value.to_ascii_lowercase()),
                "--bound" => config.locate.search_bound = value.parse().map_err(|_| invalid())?,
                "--head-len" => config.locate.head_len = value.parse().map_err(|_| invalid())?,
                "--policy" => {
                    config.locate.policy = value.parse::<MatchPolicy>().map_err(|_| invalid())?
                }
                "--page-size" => {
                    let size: u64 = value.parse().map_err(|_| invalid())?;
                    if size != 0 && !size.is_power_of_two() {
                        return Err(invalid());
                    }
                    config.page_size = size;
                }
                _ => return Err(CliError::UnknownArgument(flag.to_string())),
            }
            i += 2;
        }
        Ok(Self { config, json })
    }
}
