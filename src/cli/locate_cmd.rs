// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Locate and verify CLI subcommands.

use serde::Serialize;

use super::CommandOptions;
use crate::error::ShimError;
use crate::locator::{self, MappedBytes};
use crate::mapping::compute_alignment;

/// Result of a successful `locate`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LocateReport {
    pub container: String,
    pub lower: u64,
    pub upper: u64,
    pub len: u64,
    pub page_size: u64,
    pub alignment_offset: u64,
    pub policy: String,
    pub sha256: Option<String>,
}

/// Locate the blob described by `opts`.
///
/// When `with_digest` is set the embedded range is hashed too, and checked
/// against the expected digest if one is configured.
pub fn locate_report(opts: &CommandOptions, with_digest: bool) -> Result<LocateReport, ShimError> {
    let cfg = &opts.config;
    let container_path = cfg.container_path()?;
    let needle_path = cfg.needle_path()?;

    let container = MappedBytes::open(container_path)?;
    let needle = MappedBytes::open(needle_path)?;
    let range = locator::locate_with(container.as_bytes(), needle.as_bytes(), &cfg.locate)?;

    let sha256 = if with_digest {
        if let Some(expected) = &cfg.expected_sha256 {
            locator::verify_range_sha256(container.as_bytes(), &range, expected)?;
        }
        let bytes = &container.as_bytes()[range.lower() as usize..range.upper() as usize];
        Some(locator::sha256_hex(bytes))
    } else {
        None
    };

    let page_size = cfg.effective_page_size();
    Ok(LocateReport {
        container: container_path.display().to_string(),
        lower: range.lower(),
        upper: range.upper(),
        len: range.len(),
        page_size,
        alignment_offset: compute_alignment(range.lower(), page_size).remainder,
        policy: cfg.locate.policy.as_str().to_string(),
        sha256,
    })
}

/// Run `locate`. Returns exit code: 0 found, 1 not found or error, 2 bad arguments.
pub fn run_locate(args: &[String]) -> i32 {
    run(args, false)
}

/// Run `verify`. Like `locate`, plus a digest of the range.
pub fn run_verify(args: &[String]) -> i32 {
    run(args, true)
}

fn run(args: &[String], with_digest: bool) -> i32 {
    let opts = match CommandOptions::parse(args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    match locate_report(&opts, with_digest) {
        Ok(report) => {
            print_report(&report, opts.json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_report(report: &LocateReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }
    println!("container:        {}", report.container);
    println!("range:            [{}, {})", report.lower, report.upper);
    println!("length:           {}", report.len);
    println!("page size:        {}", report.page_size);
    println!("alignment offset: {}", report.alignment_offset);
    println!("policy:           {}", report.policy);
    if let Some(digest) = &report.sha256 {
        println!("sha256:           {}", digest);
    }
}
