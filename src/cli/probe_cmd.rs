// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Probe CLI subcommand.
//!
//! Brings up a real virtual file in the CLI process, backed by the libc
//! functions found through `dlsym(RTLD_NEXT, ..)`, and checks that reading and
//! mapping it both reproduce the needle byte for byte.

use serde::Serialize;

use super::CommandOptions;
use crate::error::ShimError;
use crate::locator::{self, MappedBytes};
use crate::registry::{unshimmed_bindings, DlsymResolver, Registry};
use crate::vfile::{Companion, Lifecycle, VirtualFile};

static PROBE_LIFECYCLE: Lifecycle = Lifecycle::new();

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProbeReport {
    pub lower: u64,
    pub len: u64,
    pub page_size: u64,
    pub alignment_offset: u64,
    pub read_matches: bool,
    pub end_offset: i64,
    /// `None` when the blob is empty and nothing was mapped.
    pub mmap_matches: Option<bool>,
    pub unmap_rc: Option<i32>,
}

impl ProbeReport {
    pub fn passed(&self) -> bool {
        self.read_matches
            && self.end_offset == self.len as i64
            && self.mmap_matches.unwrap_or(true)
            && self.unmap_rc.unwrap_or(0) == 0
    }
}

/// Exercise the virtual file end to end.
pub fn probe(opts: &CommandOptions, lifecycle: &'static Lifecycle) -> Result<ProbeReport, ShimError> {
    let cfg = &opts.config;
    let container_path = cfg.container_path()?;
    let needle = MappedBytes::open(cfg.needle_path()?)?;
    let range = locator::locate_files(container_path, needle.path(), &cfg.locate)?;

    let registry = Registry::install(&DlsymResolver, &unshimmed_bindings())?;
    let vf = VirtualFile::open(
        lifecycle,
        registry.originals(),
        container_path,
        range,
        cfg.effective_page_size(),
    )?;

    let mut buf = vec![0u8; needle.len()];
    let read_matches = vf.read_exact_at(0, &mut buf).is_ok() && buf == needle.as_bytes();
    vf.seek(0, libc::SEEK_END);
    let end_offset = vf.tell() as i64;

    let (mmap_matches, unmap_rc) = if needle.is_empty() {
        (None, None)
    } else {
        probe_mapping(&vf, needle.as_bytes())?
    };
    vf.close();

    Ok(ProbeReport {
        lower: range.lower(),
        len: range.len(),
        page_size: vf.page_size(),
        alignment_offset: vf.alignment().remainder,
        read_matches,
        end_offset,
        mmap_matches,
        unmap_rc,
    })
}

fn probe_mapping<I: crate::registry::RealIo>(
    vf: &VirtualFile<I>,
    expected: &[u8],
) -> Result<(Option<bool>, Option<i32>), ShimError> {
    // SAFETY: a fresh private read-only mapping with no fixed address.
    let addr = unsafe {
        vf.mmap(
            std::ptr::null_mut(),
            expected.len(),
            libc::PROT_READ,
            libc::MAP_PRIVATE,
            0,
        )?
    };
    if addr == libc::MAP_FAILED {
        eprintln!("mmap failed: {}", std::io::Error::last_os_error());
        return Ok((Some(false), None));
    }
    // SAFETY: the mapping is at least expected.len() bytes and stays alive
    // until the munmap below.
    let mapped = unsafe { std::slice::from_raw_parts(addr as *const u8, expected.len()) };
    let matches = mapped == expected;
    // SAFETY: addr came from vf.mmap and is not used afterwards.
    let rc = unsafe { vf.companion(Companion::Munmap, addr, expected.len()) };
    Ok((Some(matches), Some(rc)))
}

/// Run `probe`. Returns exit code: 0 pass, 1 mismatch or error, 2 bad arguments.
pub fn run_probe(args: &[String]) -> i32 {
    let opts = match CommandOptions::parse(args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    match probe(&opts, &PROBE_LIFECYCLE) {
        Ok(report) => {
            print_report(&report, opts.json);
            if report.passed() {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_report(report: &ProbeReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }
    let yes_no = |b: bool| if b { "ok" } else { "MISMATCH" };
    println!("range:            [{}, {})", report.lower, report.lower + report.len);
    println!("page size:        {}", report.page_size);
    println!("alignment offset: {}", report.alignment_offset);
    println!("read:             {}", yes_no(report.read_matches));
    println!("seek end / tell:  {}", report.end_offset);
    match report.mmap_matches {
        Some(m) => println!("mmap:             {}", yes_no(m)),
        None => println!("mmap:             skipped (empty blob)"),
    }
    if let Some(rc) = report.unmap_rc {
        println!("munmap:           rc={}", rc);
    }
    println!("result:           {}", if report.passed() { "PASS" } else { "FAIL" });
}
