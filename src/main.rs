// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! blobshim diagnostics entry point.
//!
//! ## CLI Subcommands
//!
//! - `blobshim-cli locate` - Find the blob inside the container
//! - `blobshim-cli verify` - Locate and hash the embedded range
//! - `blobshim-cli probe` - Open, read and map a virtual file in-process
//! - `blobshim-cli config show|defaults|validate`

use std::process::ExitCode;

use blobshim::cli::{config_cmd, run_locate, run_probe, run_verify};
use blobshim::config;
use blobshim::telemetry::{init_logging, LogConfig};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let rest = args.get(2..).unwrap_or(&[]);

    init_cli_logging();

    match command {
        "locate" => ExitCode::from(run_locate(rest) as u8),
        "verify" => ExitCode::from(run_verify(rest) as u8),
        "probe" => ExitCode::from(run_probe(rest) as u8),
        "config" => {
            let subcommand = rest.first().map(|s| s.as_str()).unwrap_or("show");
            let json = rest.iter().any(|a| a == "--json");
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show(json) as u8),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = rest.first() {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("blobshim {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Human-readable logs on stderr; level and file still come from the environment.
fn init_cli_logging() {
    let env = config::load();
    let cfg = LogConfig {
        format: blobshim::telemetry::LogFormat::Pretty,
        ..env.log
    };
    if let Err(e) = init_logging(&cfg) {
        eprintln!("Logging disabled: {}", e);
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "blobshim - serve an embedded model blob as a standalone file v{}

USAGE:
    blobshim-cli [COMMAND] [OPTIONS]

COMMANDS:
    locate       Find the blob inside the container
    verify       Locate the blob and hash the embedded range
    probe        Open, read and map the blob through a virtual file
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS (locate, verify, probe):
    --container PATH   Container archive (default: $BLOBSHIM_CONTAINER_PATH)
    --needle PATH      Blob asset (default: $BLOBSHIM_NEEDLE_PATH)
    --bound N          Search bound in bytes
    --policy P         full | prefix
    --head-len N       Head/tail probe length in bytes
    --page-size N      Page size override (power of two, 0 = OS)
    --sha256 HEX       Expected digest of the embedded range
    --json             Output in JSON format

ENVIRONMENT:
    BLOBSHIM_*   See 'blobshim-cli config defaults'

EXIT CODES:
    0  Success
    1  Failure
    2  Invalid arguments
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "locate" | "verify" => {
            eprintln!(
                "blobshim-cli {} - Find the blob inside the container

USAGE:
    blobshim-cli {} --container PATH --needle PATH [OPTIONS]

DESCRIPTION:
    Scans the first --bound bytes of the container for the blob and prints
    the embedded range and its page alignment. 'verify' also prints the
    SHA-256 of the range and fails if --sha256 is given and differs.

EXAMPLES:
    blobshim-cli locate --container base.apk --needle model.bin
    blobshim-cli verify --container base.apk --needle model.bin --json
",
                command, command
            );
        }
        "probe" => {
            eprintln!(
                "blobshim-cli probe - End-to-end check of the virtual file

USAGE:
    blobshim-cli probe [OPTIONS]

DESCRIPTION:
    Locates the blob, opens a virtual file over it in this process, reads it
    sequentially, seeks to the end, maps it and unmaps it, and compares every
    view with the needle.

EXIT CODES:
    0  Every view matches
    1  Mismatch or error
"
            );
        }
        "config" => {
            eprintln!(
                "blobshim-cli config - Inspect configuration

USAGE:
    blobshim-cli config <SUBCOMMAND> [--json]

SUBCOMMANDS:
    show           Show effective configuration
    validate       Check that the shim could start
    defaults       Show default configuration
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'blobshim-cli help' for general usage.",
                command
            );
        }
    }
}
