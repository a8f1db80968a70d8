// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Virtual file tests against a real container on disk.
//!
//! The virtual file is driven through the real libc functions, wrapped in a
//! recorder so the exact arguments of every mmap-family call can be checked.
//!
//! Tests cover:
//! - Sequential read reproduces the blob
//! - seek/tell in logical coordinates, including rejected seeks
//! - mmap at an unaligned offset
//! - Address correction for munmap/madvise/mlock/munlock, swept over
//!   aligned, off-by-one and arbitrary container offsets
//! - Fragmented munmap releasing shared pages once and clearing the mapping
//! - Foreign calls while the loader's mmap is still in flight
//! - Zero-length mmap, reopen after a failed rewind
//! - One-shot construction and mmap preconditions

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Mutex};

use libc::{c_char, c_int, c_long, c_void, off_t, size_t, FILE};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use blobshim::mapping::os_page_size;
use blobshim::registry::{unshimmed_bindings, DlsymResolver, Originals, RealIo, Registry};
use blobshim::vfile::{
    Companion, ContractViolation, EmbeddedRange, Lifecycle, LifecycleState, VirtualFile,
    SENTINEL_FD,
};
use blobshim::{Dispatcher, Route, ShimError};

const CONTAINER_LEN: usize = 10_000_000;
const BLOB_LEN: usize = 4096;
const BLOB_OFFSET: u64 = 999_000;

/// The kernel only aligns real mappings to its own page size.
fn page() -> u64 {
    os_page_size() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Call {
    name: &'static str,
    addr: usize,
    len: usize,
}

/// Forwards to libc and records every mmap-family call.
struct Recorder {
    inner: Originals,
    calls: Mutex<Vec<Call>>,
    /// Holds the real mmap between two rendezvous with the test thread.
    mmap_gate: Option<Barrier>,
    fail_seek: AtomicBool,
}

impl Recorder {
    fn new() -> Self {
        let registry = Registry::install(&DlsymResolver, &unshimmed_bindings()).unwrap();
        Self {
            inner: *registry.originals(),
            calls: Mutex::new(Vec::new()),
            mmap_gate: None,
            fail_seek: AtomicBool::new(false),
        }
    }

    fn gated() -> Self {
        Self {
            mmap_gate: Some(Barrier::new(2)),
            ..Self::new()
        }
    }

    fn record(&self, name: &'static str, addr: usize, len: usize) {
        self.calls.lock().unwrap().push(Call { name, addr, len });
    }

    fn calls(&self, name: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name == name)
            .copied()
            .collect()
    }
}

impl RealIo for Recorder {
    unsafe fn fopen(&self, path: *const c_char, mode: *const c_char) -> *mut FILE {
        self.inner.fopen(path, mode)
    }
    unsafe fn fclose(&self, stream: *mut FILE) -> c_int {
        self.record("fclose", stream as usize, 0);
        self.inner.fclose(stream)
    }
    unsafe fn ftell(&self, stream: *mut FILE) -> c_long {
        self.inner.ftell(stream)
    }
    unsafe fn fseek(&self, stream: *mut FILE, offset: c_long, whence: c_int) -> c_int {
        if self.fail_seek.load(Ordering::SeqCst) {
            // An invalid whence makes the real fseek fail with EINVAL.
            return self.inner.fseek(stream, offset, -1);
        }
        self.inner.fseek(stream, offset, whence)
    }
    unsafe fn fread(&self, ptr: *mut c_void, size: size_t, nitems: size_t, stream: *mut FILE) -> size_t {
        self.inner.fread(ptr, size, nitems, stream)
    }
    unsafe fn ferror(&self, stream: *mut FILE) -> c_int {
        self.inner.ferror(stream)
    }
    unsafe fn fileno(&self, stream: *mut FILE) -> c_int {
        self.inner.fileno(stream)
    }
    unsafe fn mmap(
        &self,
        addr: *mut c_void,
        len: size_t,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: off_t,
    ) -> *mut c_void {
        if let Some(gate) = &self.mmap_gate {
            gate.wait();
            gate.wait();
        }
        let out = self.inner.mmap(addr, len, prot, flags, fd, offset);
        self.record("mmap", out as usize, len);
        self.record("mmap_offset", offset as usize, len);
        out
    }
    unsafe fn madvise(&self, addr: *mut c_void, len: size_t, advice: c_int) -> c_int {
        self.record("madvise", addr as usize, len);
        self.inner.madvise(addr, len, advice)
    }
    unsafe fn munmap(&self, addr: *mut c_void, len: size_t) -> c_int {
        self.record("munmap", addr as usize, len);
        self.inner.munmap(addr, len)
    }
    unsafe fn mlock(&self, addr: *const c_void, len: size_t) -> c_int {
        self.record("mlock", addr as usize, len);
        self.inner.mlock(addr, len)
    }
    unsafe fn munlock(&self, addr: *const c_void, len: size_t) -> c_int {
        self.record("munlock", addr as usize, len);
        self.inner.munlock(addr, len)
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    container: PathBuf,
    blob: Vec<u8>,
    range: EmbeddedRange,
}

fn fixture(offset: u64) -> Fixture {
    fixture_sized(offset, BLOB_LEN)
}

fn fixture_sized(offset: u64, blob_len: usize) -> Fixture {
    let mut rng = StdRng::seed_from_u64(offset);
    let mut container = vec![0u8; CONTAINER_LEN];
    rng.fill_bytes(&mut container);
    let mut blob = vec![0u8; blob_len];
    rng.fill_bytes(&mut blob);
    let at = offset as usize;
    container[at..at + blob_len].copy_from_slice(&blob);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("container.apk");
    std::fs::File::create(&path).unwrap().write_all(&container).unwrap();
    let range = EmbeddedRange::new(offset, offset + blob_len as u64, CONTAINER_LEN as u64).unwrap();
    Fixture {
        _dir: dir,
        container: path,
        blob,
        range,
    }
}

fn lifecycle() -> &'static Lifecycle {
    Box::leak(Box::new(Lifecycle::new()))
}

fn open<'a>(fx: &Fixture, io: &'a Recorder) -> VirtualFile<&'a Recorder> {
    VirtualFile::open(lifecycle(), io, &fx.container, fx.range, page()).unwrap()
}

unsafe fn map_blob<I: RealIo>(vf: &VirtualFile<I>, len: usize) -> *mut c_void {
    vf.mmap(std::ptr::null_mut(), len, libc::PROT_READ, libc::MAP_PRIVATE, 0)
        .unwrap()
}

fn anonymous_page() -> *mut c_void {
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            page() as usize,
            libc::PROT_READ,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    assert_ne!(addr, libc::MAP_FAILED);
    addr
}

fn last_errno() -> Option<i32> {
    std::io::Error::last_os_error().raw_os_error()
}

#[test]
fn test_sequential_read_reproduces_blob() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);
    assert_eq!(vf.state(), LifecycleState::Open);
    assert_eq!(vf.tell(), 0);

    let mut buf = vec![0u8; BLOB_LEN];
    let mut filled = 0;
    while filled < BLOB_LEN {
        let chunk = (BLOB_LEN - filled).min(1000);
        let n = unsafe { vf.read(buf[filled..].as_mut_ptr().cast(), 1, chunk) };
        assert!(n > 0);
        filled += n;
    }
    assert_eq!(buf, fx.blob);
    assert_eq!(vf.tell(), BLOB_LEN as c_long);
    assert_eq!(vf.error(), 0);
    assert_eq!(vf.descriptor(), SENTINEL_FD);
}

#[test]
fn test_seek_set_and_tell() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);

    for k in [0, 1, 17, 2048, BLOB_LEN as c_long - 1, BLOB_LEN as c_long] {
        assert_eq!(vf.seek(k, libc::SEEK_SET), 0);
        assert_eq!(vf.tell(), k);
    }

    let mut byte = [0u8; 1];
    vf.read_exact_at(100, &mut byte).unwrap();
    assert_eq!(byte[0], fx.blob[100]);
}

#[test]
fn test_out_of_range_seek_leaves_cursor() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);

    assert_eq!(vf.seek(42, libc::SEEK_SET), 0);
    assert_eq!(vf.seek(-1, libc::SEEK_SET), -1);
    assert_eq!(std::io::Error::last_os_error().raw_os_error(), Some(libc::EINVAL));
    assert_eq!(vf.tell(), 42);
    assert_eq!(vf.seek(BLOB_LEN as c_long + 1, libc::SEEK_SET), -1);
    assert_eq!(vf.tell(), 42);
    assert_eq!(vf.seek(0, 99), -1);
    assert_eq!(vf.tell(), 42);
}

#[test]
fn test_seek_end_and_cur() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);

    assert_eq!(vf.seek(0, libc::SEEK_END), 0);
    assert_eq!(vf.tell(), BLOB_LEN as c_long);
    // Any offset on SEEK_END lands on the end.
    assert_eq!(vf.seek(-100, libc::SEEK_END), 0);
    assert_eq!(vf.tell(), BLOB_LEN as c_long);

    assert_eq!(vf.seek(10, libc::SEEK_SET), 0);
    assert_eq!(vf.seek(5, libc::SEEK_CUR), 0);
    assert_eq!(vf.tell(), 15);
    assert_eq!(vf.seek(-15, libc::SEEK_CUR), 0);
    assert_eq!(vf.tell(), 0);
}

#[test]
fn test_mmap_unaligned_offset() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);
    let remainder = (BLOB_OFFSET % page()) as usize;
    assert_eq!(vf.alignment().remainder as usize, remainder);

    let addr = unsafe { map_blob(&vf, BLOB_LEN) };
    assert_ne!(addr, libc::MAP_FAILED);
    let mapped = unsafe { std::slice::from_raw_parts(addr as *const u8, BLOB_LEN) };
    assert_eq!(mapped, &fx.blob[..]);

    let real = io.calls("mmap")[0];
    assert_eq!(real.addr + remainder, addr as usize);
    assert_eq!(real.len, BLOB_LEN + remainder);
    assert_eq!(io.calls("mmap_offset")[0].addr as u64 % page(), 0);

    let active = vf.active_mapping().unwrap();
    assert_eq!(active.caller_base(), addr as usize);
    assert_eq!(active.real_base(), real.addr);

    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr, BLOB_LEN) }, 0);
    assert!(vf.active_mapping().is_none());
    assert!(!vf.owns_address(addr));
}

#[test]
fn test_mmap_with_16k_page_size() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = VirtualFile::open(lifecycle(), &io, &fx.container, fx.range, 16384).unwrap();
    assert_eq!(vf.alignment().remainder, BLOB_OFFSET % 16384);

    let addr = unsafe { map_blob(&vf, BLOB_LEN) };
    assert_ne!(addr, libc::MAP_FAILED);
    let mapped = unsafe { std::slice::from_raw_parts(addr as *const u8, BLOB_LEN) };
    assert_eq!(mapped, &fx.blob[..]);
    let real = io.calls("mmap")[0];
    assert_eq!(real.addr, addr as usize - (BLOB_OFFSET % 16384) as usize);
    assert_eq!(io.calls("mmap_offset")[0].addr % 16384, 0);

    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr, BLOB_LEN) }, 0);
    let released = io.calls("munmap")[0];
    assert_eq!(released.addr, real.addr);
    assert_eq!(released.len, real.len);
}

#[test]
fn test_mmap_aligned_offset_has_no_slack() {
    let fx = fixture(page() * 40);
    let io = Recorder::new();
    let vf = open(&fx, &io);
    let addr = unsafe { map_blob(&vf, 100) };
    let real = io.calls("mmap")[0];
    assert_eq!(real.addr, addr as usize);
    assert_eq!(real.len, 100);
    let mapped = unsafe { std::slice::from_raw_parts(addr as *const u8, 100) };
    assert_eq!(mapped, &fx.blob[..100]);
    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr, 100) }, 0);
}

#[test]
fn test_companion_calls_receive_real_base() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);
    let addr = unsafe { map_blob(&vf, BLOB_LEN) };
    let real_base = io.calls("mmap")[0].addr;
    assert_eq!(real_base as u64 % page(), 0);
    assert_eq!(real_base, addr as usize - (BLOB_OFFSET % page()) as usize);

    unsafe {
        assert_eq!(vf.companion(Companion::Madvise(libc::MADV_WILLNEED), addr, BLOB_LEN), 0);
        // mlock may hit RLIMIT_MEMLOCK; only the forwarded address matters here.
        vf.companion(Companion::Mlock, addr, BLOB_LEN);
        vf.companion(Companion::Munlock, addr, BLOB_LEN);
    }
    for name in ["madvise", "mlock", "munlock"] {
        let call = io.calls(name)[0];
        assert_eq!(call.addr, real_base, "{}", name);
        assert_eq!(call.len, BLOB_LEN + (BLOB_OFFSET % page()) as usize, "{}", name);
    }

    // Interior address: rounded down onto a page boundary at or above the real base.
    let interior = (addr as usize + 1000) as *mut c_void;
    assert_eq!(unsafe { vf.companion(Companion::Madvise(libc::MADV_NORMAL), interior, 10) }, 0);
    let call = io.calls("madvise")[1];
    assert_eq!(call.addr as u64 % page(), 0);
    assert!(call.addr >= real_base);
    assert!(call.addr <= interior as usize);

    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr, BLOB_LEN) }, 0);
    assert_eq!(io.calls("munmap")[0].addr, real_base);
}

#[test]
fn test_foreign_addresses_pass_through() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);
    let addr = unsafe { map_blob(&vf, BLOB_LEN) };

    let other = anonymous_page();
    assert!(!vf.owns_address(other));
    let len = page() as usize;
    assert_eq!(unsafe { vf.companion(Companion::Munmap, other, len) }, 0);
    assert_eq!(
        io.calls("munmap"),
        vec![Call {
            name: "munmap",
            addr: other as usize,
            len
        }]
    );
    assert!(vf.active_mapping().is_some());

    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr, BLOB_LEN) }, 0);
}

#[test]
fn test_mmap_preconditions() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);

    let err = unsafe { vf.mmap(std::ptr::null_mut(), 10, libc::PROT_READ, libc::MAP_PRIVATE, 4096) };
    assert_eq!(err, Err(ContractViolation::NonZeroMapOffset(4096)));

    let err = unsafe {
        vf.mmap(std::ptr::null_mut(), BLOB_LEN + 1, libc::PROT_READ, libc::MAP_PRIVATE, 0)
    };
    assert!(matches!(err, Err(ContractViolation::MapBeyondRange { .. })));

    let err = unsafe {
        vf.mmap(
            std::ptr::null_mut(),
            10,
            libc::PROT_READ,
            libc::MAP_PRIVATE | libc::MAP_FIXED,
            0,
        )
    };
    assert_eq!(err, Err(ContractViolation::FixedMapping));

    let addr = unsafe { map_blob(&vf, BLOB_LEN) };
    let err = unsafe { vf.mmap(std::ptr::null_mut(), 10, libc::PROT_READ, libc::MAP_PRIVATE, 0) };
    assert_eq!(err, Err(ContractViolation::MappingActive(addr as usize)));
    assert!(io.calls("mmap").len() == 1);

    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr, BLOB_LEN) }, 0);
}

#[test]
fn test_zero_length_mmap_fails_with_einval() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);

    let out = unsafe { vf.mmap(std::ptr::null_mut(), 0, libc::PROT_READ, libc::MAP_PRIVATE, 0) };
    assert_eq!(out, Ok(libc::MAP_FAILED));
    assert_eq!(last_errno(), Some(libc::EINVAL));
    assert!(io.calls("mmap").is_empty());
    assert!(vf.active_mapping().is_none());

    // The slot is still free for a real mapping.
    let addr = unsafe { map_blob(&vf, BLOB_LEN) };
    assert_ne!(addr, libc::MAP_FAILED);
    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr, BLOB_LEN) }, 0);
}

#[test]
fn test_fragmented_munmap_releases_mapping() {
    let p = page() as usize;
    let len = p * 8;
    let fx = fixture_sized(BLOB_OFFSET, len);
    let io = Recorder::new();
    let vf = open(&fx, &io);
    let addr = unsafe { map_blob(&vf, len) } as usize;
    let real_base = io.calls("mmap")[0].addr;
    assert!(addr > real_base);

    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr as *mut c_void, p * 4) }, 0);
    assert!(vf.active_mapping().is_some());
    // Fully released pages are gone; the page shared with the rest is kept.
    assert!(!vf.owns_address((addr + p) as *const c_void));
    assert!(vf.owns_address((addr + p * 4) as *const c_void));

    assert_eq!(
        unsafe { vf.companion(Companion::Munmap, (addr + p * 4) as *mut c_void, p * 4) },
        0
    );
    assert!(vf.active_mapping().is_none());
    assert!(!vf.owns_address((addr + p * 4) as *const c_void));

    let released = io.calls("munmap");
    assert_eq!(released.len(), 2);
    assert_eq!((released[0].addr, released[0].len), (real_base, p * 4));
    assert_eq!(released[1].addr, real_base + p * 4);
    assert_eq!(released[1].addr + released[1].len, addr + len);
}

#[test]
#[cfg(any(target_os = "linux", target_os = "android"))]
fn test_foreign_mapping_in_released_hole_passes_through() {
    let p = page() as usize;
    let len = p * 8;
    let fx = fixture_sized(BLOB_OFFSET, len);
    let io = Recorder::new();
    let vf = open(&fx, &io);
    let addr = unsafe { map_blob(&vf, len) } as usize;
    let real_base = io.calls("mmap")[0].addr;

    assert_eq!(unsafe { vf.companion(Companion::Munmap, addr as *mut c_void, p * 4) }, 0);
    let hole = (real_base + p * 2) as *mut c_void;
    assert!(!vf.owns_address(hole));

    // Another mapping may legitimately land in the released pages.
    let placed = unsafe {
        libc::mmap(
            hole,
            p,
            libc::PROT_READ,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED_NOREPLACE,
            -1,
            0,
        )
    };
    if placed == hole {
        let before = io.calls("munmap").len();
        assert_eq!(unsafe { vf.companion(Companion::Munmap, hole, p) }, 0);
        let forwarded = io.calls("munmap")[before];
        assert_eq!((forwarded.addr, forwarded.len), (hole as usize, p));
    } else if placed != libc::MAP_FAILED {
        unsafe { libc::munmap(placed, p) };
    }
    assert!(vf.active_mapping().is_some());

    let rest = (addr + p * 4) as *mut c_void;
    assert_eq!(unsafe { vf.companion(Companion::Munmap, rest, p * 4) }, 0);
    assert!(vf.active_mapping().is_none());
}

#[test]
fn test_foreign_calls_proceed_during_mmap_in_flight() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::gated();
    let vf = open(&fx, &io);
    let dispatcher = Dispatcher::new(Path::new("/virtual/model.gguf")).unwrap();
    let other = anonymous_page();
    let gate = io.mmap_gate.as_ref().unwrap();

    std::thread::scope(|s| {
        let loader = s.spawn(|| unsafe { map_blob(&vf, BLOB_LEN) } as usize);
        // The loader is now inside the real mmap.
        gate.wait();
        assert_eq!(dispatcher.route_address(Some(&vf), other), Route::PassThrough);
        assert!(!vf.owns_address(other));
        assert_eq!(
            unsafe { vf.companion(Companion::Madvise(libc::MADV_NORMAL), other, page() as usize) },
            0
        );
        let second = unsafe { vf.mmap(std::ptr::null_mut(), 10, libc::PROT_READ, libc::MAP_PRIVATE, 0) };
        assert_eq!(second, Err(ContractViolation::ConcurrentAccess));
        gate.wait();

        let addr = loader.join().unwrap();
        assert_eq!(vf.active_mapping().unwrap().caller_base(), addr);
        assert_eq!(
            dispatcher.route_address(Some(&vf), addr as *const c_void),
            Route::Virtual
        );
        assert_eq!(unsafe { vf.companion(Companion::Munmap, addr as *mut c_void, BLOB_LEN) }, 0);
    });

    assert_eq!(io.calls("madvise")[0].addr, other as usize);
    assert_eq!(unsafe { libc::munmap(other, page() as usize) }, 0);
}

#[test]
fn test_companion_addresses_stay_page_aligned_across_offsets() {
    let p = page() as usize;
    let len = p * 8;
    for offset in [page() * 40, page() * 40 + 1, page() * 41 - 1, BLOB_OFFSET] {
        let fx = fixture_sized(offset, len);
        let io = Recorder::new();
        let vf = open(&fx, &io);
        let addr = unsafe { map_blob(&vf, len) } as usize;
        let real_base = io.calls("mmap")[0].addr;
        let end = addr + len;
        assert_eq!(real_base % p, 0, "offset {offset}");
        assert_eq!(addr - real_base, (offset % page()) as usize, "offset {offset}");

        let calls = [
            Companion::Madvise(libc::MADV_NORMAL),
            Companion::Mlock,
            Companion::Munlock,
        ];
        for at in [addr, addr + 1, addr + p - 1, addr + p, end - 1] {
            for call in calls {
                // mlock may hit RLIMIT_MEMLOCK; only the forwarded range matters.
                unsafe { vf.companion(call, at as *mut c_void, 16) };
            }
        }
        for call in calls {
            let seen = io.calls(call.name());
            assert_eq!(seen.len(), 5, "offset {offset} {}", call.name());
            for c in seen {
                assert_eq!(c.addr % p, 0, "offset {offset} {c:?}");
                assert!(c.addr >= real_base, "offset {offset} {c:?}");
                assert!(c.addr + c.len <= end, "offset {offset} {c:?}");
            }
        }

        unsafe {
            vf.companion(Companion::Munmap, (addr + p + 1) as *mut c_void, p * 2);
            vf.companion(Companion::Munmap, addr as *mut c_void, len);
        }
        assert!(vf.active_mapping().is_none(), "offset {offset}");
        for c in io.calls("munmap") {
            assert_eq!(c.addr % p, 0, "offset {offset} {c:?}");
            assert!(c.addr >= real_base, "offset {offset} {c:?}");
            assert!(c.addr + c.len <= end, "offset {offset} {c:?}");
        }
    }
}

#[test]
fn test_reopen_rewinds_or_reports_failure() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);

    assert_eq!(vf.seek(100, libc::SEEK_SET), 0);
    assert_eq!(vf.reopen(), vf.stream());
    assert_eq!(vf.tell(), 0);

    assert_eq!(vf.seek(100, libc::SEEK_SET), 0);
    io.fail_seek.store(true, Ordering::SeqCst);
    assert!(vf.reopen().is_null());
    assert_eq!(last_errno(), Some(libc::EINVAL));
    io.fail_seek.store(false, Ordering::SeqCst);
    assert_eq!(vf.tell(), 100);

    assert_eq!(vf.reopen(), vf.stream());
    assert_eq!(vf.tell(), 0);
}

#[test]
fn test_second_construction_fails() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let guard = lifecycle();
    let vf = VirtualFile::open(guard, &io, &fx.container, fx.range, page()).unwrap();

    let err = VirtualFile::open(guard, &io, &fx.container, fx.range, page()).err().unwrap();
    assert!(matches!(
        err,
        ShimError::Contract(ContractViolation::AlreadyConstructed {
            state: LifecycleState::Open
        })
    ));
    assert_eq!(vf.state(), LifecycleState::Open);
}

#[test]
fn test_failed_open_closes_guard() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let guard = lifecycle();
    let missing = fx.container.with_file_name("missing.apk");
    let err = VirtualFile::open(guard, &io, &missing, fx.range, page()).err().unwrap();
    assert_eq!(err.category(), "container_open");
    assert_eq!(guard.state(), LifecycleState::Closed);

    let err = VirtualFile::open(guard, &io, &fx.container, fx.range, page()).err().unwrap();
    assert!(err.is_contract_violation());
}

#[test]
fn test_invalid_page_size_rejected() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let err = VirtualFile::open(lifecycle(), &io, &fx.container, fx.range, 12_000).err().unwrap();
    assert!(matches!(
        err,
        ShimError::Contract(ContractViolation::InvalidPageSize(12_000))
    ));
}

#[test]
fn test_close_is_idempotent() {
    let fx = fixture(BLOB_OFFSET);
    let io = Recorder::new();
    let vf = open(&fx, &io);
    vf.close();
    vf.close();
    assert_eq!(vf.state(), LifecycleState::Closed);
    drop(vf);
    assert_eq!(io.calls("fclose").len(), 1);
}
