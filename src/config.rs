// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shim configuration loading from environment variables.
//!
//! All configuration values are loaded from `BLOBSHIM_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without
//! crashing; the fallback is remembered so `config validate` can report it.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `BLOBSHIM_CONTAINER_PATH` | unset | Container archive holding the blob |
//! | `BLOBSHIM_NEEDLE_PATH` | unset | Directly readable copy of the blob |
//! | `BLOBSHIM_SENTINEL_PATH` | `/.blobshim/embedded-model.bin` | Path that opens the virtual file |
//! | `BLOBSHIM_SEARCH_BOUND` | 268435456 | Locator window (bytes) |
//! | `BLOBSHIM_MATCH_POLICY` | `full` | `full` or `prefix` |
//! | `BLOBSHIM_HEAD_LEN` | 65536 | Head/tail probe length (bytes) |
//! | `BLOBSHIM_PAGE_SIZE` | 0 | Page size override (0 = OS page size) |
//! | `BLOBSHIM_EXPECTED_SHA256` | unset | Digest of the embedded range |
//! | `BLOBSHIM_LOG_LEVEL` | `warn` | Log filter directive |
//! | `BLOBSHIM_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `BLOBSHIM_LOG_PATH` | unset | Log file (stderr when unset) |

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::locator::{LocateOptions, MatchPolicy};
use crate::mapping::os_page_size;
use crate::telemetry::{LogConfig, LogFormat};

pub const CONTAINER_PATH_VAR: &str = "BLOBSHIM_CONTAINER_PATH";
pub const NEEDLE_PATH_VAR: &str = "BLOBSHIM_NEEDLE_PATH";
pub const SENTINEL_PATH_VAR: &str = "BLOBSHIM_SENTINEL_PATH";
pub const SEARCH_BOUND_VAR: &str = "BLOBSHIM_SEARCH_BOUND";
pub const MATCH_POLICY_VAR: &str = "BLOBSHIM_MATCH_POLICY";
pub const HEAD_LEN_VAR: &str = "BLOBSHIM_HEAD_LEN";
pub const PAGE_SIZE_VAR: &str = "BLOBSHIM_PAGE_SIZE";
pub const EXPECTED_SHA256_VAR: &str = "BLOBSHIM_EXPECTED_SHA256";
pub const LOG_LEVEL_VAR: &str = "BLOBSHIM_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "BLOBSHIM_LOG_FORMAT";
pub const LOG_PATH_VAR: &str = "BLOBSHIM_LOG_PATH";

pub const DEFAULT_SENTINEL_PATH: &str = "/.blobshim/embedded-model.bin";
pub const DEFAULT_SEARCH_BOUND: u64 = 256 * 1024 * 1024;
pub const DEFAULT_HEAD_LEN: usize = 64 * 1024;
const MIN_SEARCH_BOUND: u64 = 4096;
const MIN_HEAD_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Effective shim configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub container_path: Option<String>,
    pub needle_path: Option<String>,
    pub sentinel_path: String,
    pub search_bound: u64,
    pub match_policy: String,
    pub head_len: usize,
    pub page_size: u64,
    pub expected_sha256: Option<String>,
    pub log_level: String,
    pub log_format: String,
    pub log_path: Option<String>,
}

/// All shim configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub container_path: Option<PathBuf>,
    pub needle_path: Option<PathBuf>,
    pub sentinel_path: PathBuf,
    pub locate: LocateOptions,
    /// 0 means "ask the OS".
    pub page_size: u64,
    pub expected_sha256: Option<String>,
    pub log: LogConfig,
    /// Values that were present but rejected in favour of the default.
    pub rejected: Vec<ConfigError>,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &'static str, default: usize, rejected: &mut Vec<ConfigError>) -> usize {
    parse_with(key, default, rejected, |v| {
        v.parse::<usize>().map_err(|e| e.to_string())
    })
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &'static str, default: u64, rejected: &mut Vec<ConfigError>) -> u64 {
    parse_with(key, default, rejected, |v| {
        v.parse::<u64>().map_err(|e| e.to_string())
    })
}

fn parse_with<T>(
    key: &'static str,
    default: T,
    rejected: &mut Vec<ConfigError>,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> T {
    match std::env::var(key) {
        Ok(val) => match parse(val.trim()) {
            Ok(v) => v,
            Err(reason) => {
                rejected.push(ConfigError::Invalid {
                    key,
                    value: val,
                    reason,
                });
                default
            }
        },
        Err(_) => default,
    }
}

/// Non-empty path from env.
fn parse_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load locator tuning from environment.
fn load_locate_options(rejected: &mut Vec<ConfigError>) -> LocateOptions {
    let search_bound = parse_u64(SEARCH_BOUND_VAR, DEFAULT_SEARCH_BOUND, rejected);
    let head_len = parse_usize(HEAD_LEN_VAR, DEFAULT_HEAD_LEN, rejected);
    let policy = parse_with(MATCH_POLICY_VAR, MatchPolicy::default(), rejected, |v| {
        v.parse::<MatchPolicy>()
    });
    LocateOptions {
        search_bound: search_bound.max(MIN_SEARCH_BOUND),
        head_len: head_len.max(MIN_HEAD_LEN),
        policy,
    }
}

fn load_page_size(rejected: &mut Vec<ConfigError>) -> u64 {
    parse_with(PAGE_SIZE_VAR, 0, rejected, |v| {
        let size = v.parse::<u64>().map_err(|e| e.to_string())?;
        if size != 0 && !size.is_power_of_two() {
            return Err("not a power of two".to_string());
        }
        Ok(size)
    })
}

fn load_expected_digest(rejected: &mut Vec<ConfigError>) -> Option<String> {
    parse_with(EXPECTED_SHA256_VAR, None, rejected, |v| {
        if v.is_empty() {
            return Ok(None);
        }
        let bytes = hex::decode(v).map_err(|e| e.to_string())?;
        if bytes.len() != 32 {
            return Err(format!("expected 32 bytes, got {}", bytes.len()));
        }
        Ok(Some(v.to_ascii_lowercase()))
    })
}

/// Load logging configuration from environment.
fn load_log_config(rejected: &mut Vec<ConfigError>) -> LogConfig {
    let defaults = LogConfig::default();
    let level = std::env::var(LOG_LEVEL_VAR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.level);
    let format = parse_with(LOG_FORMAT_VAR, defaults.format, rejected, |v| {
        v.parse::<LogFormat>()
    });
    LogConfig {
        format,
        level,
        output_path: parse_path(LOG_PATH_VAR),
    }
}

/// The sentinel path alone, for routing before anything else is loaded.
pub fn sentinel_path() -> PathBuf {
    parse_path(SENTINEL_PATH_VAR).unwrap_or_else(|| PathBuf::from(DEFAULT_SENTINEL_PATH))
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let mut rejected = Vec::new();
    let locate = load_locate_options(&mut rejected);
    let page_size = load_page_size(&mut rejected);
    let expected_sha256 = load_expected_digest(&mut rejected);
    let log = load_log_config(&mut rejected);

    EnvConfig {
        container_path: parse_path(CONTAINER_PATH_VAR),
        needle_path: parse_path(NEEDLE_PATH_VAR),
        sentinel_path: sentinel_path(),
        locate,
        page_size,
        expected_sha256,
        log,
        rejected,
    }
}

impl EnvConfig {
    pub fn container_path(&self) -> Result<&Path, ConfigError> {
        self.container_path
            .as_deref()
            .ok_or(ConfigError::Missing(CONTAINER_PATH_VAR))
    }

    pub fn needle_path(&self) -> Result<&Path, ConfigError> {
        self.needle_path
            .as_deref()
            .ok_or(ConfigError::Missing(NEEDLE_PATH_VAR))
    }

    /// Page size used for mapping: the override, or the OS page size.
    pub fn effective_page_size(&self) -> u64 {
        if self.page_size == 0 {
            os_page_size() as u64
        } else {
            self.page_size
        }
    }

    /// Everything that stops the shim from coming up, plus rejected values.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = self.rejected.clone();
        if let Err(e) = self.container_path() {
            issues.push(e);
        }
        if let Err(e) = self.needle_path() {
            issues.push(e);
        }
        issues
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let display = |p: &Path| p.display().to_string();
        EffectiveConfig {
            container_path: self.container_path.as_deref().map(display),
            needle_path: self.needle_path.as_deref().map(display),
            sentinel_path: display(&self.sentinel_path),
            search_bound: self.locate.search_bound,
            match_policy: self.locate.policy.as_str().to_string(),
            head_len: self.locate.head_len,
            page_size: self.effective_page_size(),
            expected_sha256: self.expected_sha256.clone(),
            log_level: self.log.level.clone(),
            log_format: self.log.format.as_str().to_string(),
            log_path: self.log.output_path.as_deref().map(display),
        }
    }
}
