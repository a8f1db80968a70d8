// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Exported entry points of the preload library.
//!
//! Only compiled with the `preload` feature. On Linux the shims are exported
//! under the libc names and win by `LD_PRELOAD` symbol precedence; on macOS
//! they are registered in the `__interpose` section (see `interpose.rs`).
//! Either way, every call that does not name the virtual file goes straight to
//! the original implementation recorded in the registry.
//!
//! Process-wide state:
//!
//! - the registry, installed by the library constructor or by the first shim
//!   that runs, whichever comes first;
//! - the dispatcher, holding only the sentinel path, read on the first
//!   `fopen` of any path;
//! - the rest of the configuration, read once when the virtual file is built;
//! - the virtual file, built on the first `fopen` of the sentinel path and
//!   closed from an `atexit` handler.

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod interpose;

use std::sync::OnceLock;

use libc::{c_char, c_int, c_long, c_void, off_t, size_t, FILE};

use crate::config::{self, EnvConfig};
use crate::dispatch::{Dispatcher, Route};
use crate::error::ShimError;
use crate::errno;
use crate::locator::{self, MappedBytes};
use crate::registry::{self, DlsymResolver, Originals, RealIo};
use crate::telemetry::{self, ShimSpan, SpanExt};
use crate::vfile::{Companion, Lifecycle, VirtualFile};

type ShimFile = VirtualFile<&'static Originals>;

static LIFECYCLE: Lifecycle = Lifecycle::new();
static SETTINGS: OnceLock<EnvConfig> = OnceLock::new();
static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();
static VFILE: OnceLock<ShimFile> = OnceLock::new();

/// Log `err` and abort the process. The only way the shim terminates.
pub fn fatal(err: &ShimError) -> ! {
    tracing::error!(category = err.category(), error = %err, "blobshim fatal error");
    eprintln!("blobshim: fatal: {}", err);
    std::process::abort()
}

/// `(name, shim)` for every intercepted entry point.
pub fn bindings() -> [(&'static str, *const c_void); 12] {
    [
        ("fopen", blobshim_fopen as *const c_void),
        ("fclose", blobshim_fclose as *const c_void),
        ("ftell", blobshim_ftell as *const c_void),
        ("fseek", blobshim_fseek as *const c_void),
        ("fread", blobshim_fread as *const c_void),
        ("ferror", blobshim_ferror as *const c_void),
        ("fileno", blobshim_fileno as *const c_void),
        ("mmap", blobshim_mmap as *const c_void),
        ("madvise", blobshim_madvise as *const c_void),
        ("munmap", blobshim_munmap as *const c_void),
        ("mlock", blobshim_mlock as *const c_void),
        ("munlock", blobshim_munlock as *const c_void),
    ]
}

fn originals() -> &'static Originals {
    if let Some(registry) = registry::global() {
        return registry.originals();
    }
    match registry::install_global(&DlsymResolver, &bindings()) {
        Ok(registry) => registry.originals(),
        Err(e) => fatal(&e.into()),
    }
}

fn settings() -> &'static EnvConfig {
    SETTINGS.get_or_init(config::load)
}

fn dispatcher() -> &'static Dispatcher {
    DISPATCHER.get_or_init(|| {
        let sentinel = config::sentinel_path();
        Dispatcher::new(&sentinel).unwrap_or_else(|| {
            fatal(&ShimError::Config(config::ConfigError::Invalid {
                key: config::SENTINEL_PATH_VAR,
                value: sentinel.display().to_string(),
                reason: "contains a NUL byte".to_string(),
            }))
        })
    })
}

/// The virtual file if it has been built. Never triggers construction.
fn current() -> Option<&'static ShimFile> {
    VFILE.get()
}

/// The virtual file, if `route` says the call is about it.
///
/// Builds nothing: until the first sentinel `fopen` every call passes
/// straight through without reading the configuration.
fn routed(route: impl FnOnce(&Dispatcher, &'static ShimFile) -> Route) -> Option<&'static ShimFile> {
    let vf = current()?;
    (route(dispatcher(), vf) == Route::Virtual).then_some(vf)
}

/// The virtual file, built on first use.
fn virtual_file() -> &'static ShimFile {
    VFILE.get_or_init(|| construct().unwrap_or_else(|e| fatal(&e)))
}

fn construct() -> Result<ShimFile, ShimError> {
    let cfg = settings();
    if let Err(e) = telemetry::init_logging(&cfg.log) {
        tracing::debug!(error = %e, "Logging not initialized by blobshim");
    }
    for issue in &cfg.rejected {
        tracing::warn!(issue = %issue, "Configuration value rejected, using default");
    }

    let originals = originals();
    let container = cfg.container_path()?;
    let needle = cfg.needle_path()?;

    let span = ShimSpan::locate(container, cfg.locate.search_bound);
    let range = {
        let _enter = span.enter();
        let result = locator::locate_files(container, needle, &cfg.locate);
        span.record_result(&result);
        result?
    };

    if let Some(expected) = &cfg.expected_sha256 {
        let bytes = MappedBytes::open(container)?;
        locator::verify_range_sha256(bytes.as_bytes(), &range, expected)?;
        tracing::info!(sha256 = %expected, "Embedded range digest verified");
    }

    let vf = VirtualFile::open(
        &LIFECYCLE,
        originals,
        container,
        range,
        cfg.effective_page_size(),
    )?;
    // SAFETY: teardown is a plain extern "C" fn with no arguments.
    if unsafe { libc::atexit(teardown) } != 0 {
        tracing::warn!("Could not register exit handler; container handle stays open");
    }
    Ok(vf)
}

extern "C" fn teardown() {
    if let Some(vf) = current() {
        vf.close();
    }
}

extern "C" fn init() {
    originals();
}

#[used]
#[cfg_attr(
    any(target_os = "linux", target_os = "android"),
    link_section = ".init_array"
)]
#[cfg_attr(
    any(target_os = "macos", target_os = "ios"),
    link_section = "__DATA,__mod_init_func"
)]
static INIT: extern "C" fn() = init;

fn unwrap_contract<T>(result: Result<T, crate::vfile::ContractViolation>) -> T {
    result.unwrap_or_else(|e| fatal(&e.into()))
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "fopen")]
pub unsafe extern "C" fn blobshim_fopen(path: *const c_char, mode: *const c_char) -> *mut FILE {
    match dispatcher().route_path(path) {
        Route::Virtual => {
            let stream = virtual_file().reopen();
            errno::preserve(|| {
                if stream.is_null() {
                    tracing::warn!("Sentinel open failed: could not rewind the virtual file");
                } else {
                    tracing::debug!("Sentinel opened");
                }
            });
            stream
        }
        Route::PassThrough => originals().fopen(path, mode),
    }
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "fclose")]
pub unsafe extern "C" fn blobshim_fclose(stream: *mut FILE) -> c_int {
    match routed(|d, vf| d.route_stream(Some(vf), stream)) {
        // The handle lives until exit; a later fopen of the sentinel gets it back.
        Some(_) => 0,
        None => originals().fclose(stream),
    }
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "ftell")]
pub unsafe extern "C" fn blobshim_ftell(stream: *mut FILE) -> c_long {
    match routed(|d, vf| d.route_stream(Some(vf), stream)) {
        Some(vf) => vf.tell(),
        None => originals().ftell(stream),
    }
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "fseek")]
pub unsafe extern "C" fn blobshim_fseek(stream: *mut FILE, offset: c_long, whence: c_int) -> c_int {
    match routed(|d, vf| d.route_stream(Some(vf), stream)) {
        Some(vf) => vf.seek(offset, whence),
        None => originals().fseek(stream, offset, whence),
    }
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "fread")]
pub unsafe extern "C" fn blobshim_fread(
    ptr: *mut c_void,
    size: size_t,
    nitems: size_t,
    stream: *mut FILE,
) -> size_t {
    match routed(|d, vf| d.route_stream(Some(vf), stream)) {
        Some(vf) => vf.read(ptr, size, nitems),
        None => originals().fread(ptr, size, nitems, stream),
    }
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "ferror")]
pub unsafe extern "C" fn blobshim_ferror(stream: *mut FILE) -> c_int {
    match routed(|d, vf| d.route_stream(Some(vf), stream)) {
        Some(vf) => vf.error(),
        None => originals().ferror(stream),
    }
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "fileno")]
pub unsafe extern "C" fn blobshim_fileno(stream: *mut FILE) -> c_int {
    match routed(|d, vf| d.route_stream(Some(vf), stream)) {
        Some(vf) => vf.descriptor(),
        None => originals().fileno(stream),
    }
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "mmap")]
pub unsafe extern "C" fn blobshim_mmap(
    addr: *mut c_void,
    len: size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: off_t,
) -> *mut c_void {
    match routed(|d, vf| d.route_descriptor(Some(vf), fd)) {
        Some(vf) => unwrap_contract(vf.mmap(addr, len, prot, flags, offset)),
        None => originals().mmap(addr, len, prot, flags, fd, offset),
    }
}

unsafe fn companion(call: Companion, addr: *mut c_void, len: size_t) -> c_int {
    match routed(|d, vf| d.route_address(Some(vf), addr)) {
        Some(vf) => vf.companion(call, addr, len),
        None => {
            let io = originals();
            match call {
                Companion::Madvise(advice) => io.madvise(addr, len, advice),
                Companion::Munmap => io.munmap(addr, len),
                Companion::Mlock => io.mlock(addr, len),
                Companion::Munlock => io.munlock(addr, len),
            }
        }
    }
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "madvise")]
pub unsafe extern "C" fn blobshim_madvise(addr: *mut c_void, len: size_t, advice: c_int) -> c_int {
    companion(Companion::Madvise(advice), addr, len)
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "munmap")]
pub unsafe extern "C" fn blobshim_munmap(addr: *mut c_void, len: size_t) -> c_int {
    companion(Companion::Munmap, addr, len)
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "mlock")]
pub unsafe extern "C" fn blobshim_mlock(addr: *const c_void, len: size_t) -> c_int {
    companion(Companion::Mlock, addr as *mut c_void, len)
}

#[cfg_attr(any(target_os = "linux", target_os = "android"), export_name = "munlock")]
pub unsafe extern "C" fn blobshim_munlock(addr: *const c_void, len: size_t) -> c_int {
    companion(Companion::Munlock, addr as *mut c_void, len)
}
