// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables,
//! exactly as the preload library would at startup.

use crate::config::{self, EffectiveConfig};

/// Print effective config as key-value pairs (or JSON) to stdout.
pub fn run_show(json: bool) -> i32 {
    let cfg = config::load().effective_config();
    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        print_config(&cfg);
    }
    0
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("{}=", config::CONTAINER_PATH_VAR);
    println!("{}=", config::NEEDLE_PATH_VAR);
    println!("{}={}", config::SENTINEL_PATH_VAR, config::DEFAULT_SENTINEL_PATH);
    println!("{}={}", config::SEARCH_BOUND_VAR, config::DEFAULT_SEARCH_BOUND);
    println!("{}=full", config::MATCH_POLICY_VAR);
    println!("{}={}", config::HEAD_LEN_VAR, config::DEFAULT_HEAD_LEN);
    println!("{}=0", config::PAGE_SIZE_VAR);
    println!("{}=", config::EXPECTED_SHA256_VAR);
    println!("{}=warn", config::LOG_LEVEL_VAR);
    println!("{}=json", config::LOG_FORMAT_VAR);
    println!("{}=", config::LOG_PATH_VAR);
}

/// Validate configuration for misconfigurations that would stop the shim.
///
/// Returns 0 if valid, 1 if any problems are found.
pub fn run_validate() -> i32 {
    let issues = config::load().validate();
    for issue in &issues {
        eprintln!("WARNING: {}", issue);
    }
    if issues.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn print_config(cfg: &EffectiveConfig) {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    println!("{}={}", config::CONTAINER_PATH_VAR, opt(&cfg.container_path));
    println!("{}={}", config::NEEDLE_PATH_VAR, opt(&cfg.needle_path));
    println!("{}={}", config::SENTINEL_PATH_VAR, cfg.sentinel_path);
    println!("{}={}", config::SEARCH_BOUND_VAR, cfg.search_bound);
    println!("{}={}", config::MATCH_POLICY_VAR, cfg.match_policy);
    println!("{}={}", config::HEAD_LEN_VAR, cfg.head_len);
    println!("{}={}", config::PAGE_SIZE_VAR, cfg.page_size);
    println!("{}={}", config::EXPECTED_SHA256_VAR, opt(&cfg.expected_sha256));
    println!("{}={}", config::LOG_LEVEL_VAR, cfg.log_level);
    println!("{}={}", config::LOG_FORMAT_VAR, cfg.log_format);
    println!("{}={}", config::LOG_PATH_VAR, opt(&cfg.log_path));
}
