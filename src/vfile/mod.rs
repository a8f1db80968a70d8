// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! The virtual file: an embedded byte range presented as a standalone file.
//!
//! The real cursor of the retained container handle always sits at
//! `lower + logical`, so `read` needs no translation at all; only `seek`,
//! `tell` and the mmap family do.
//!
//! The mapping slot sits behind an `RwLock` that only guards bookkeeping:
//! it is never held across a real syscall, a log line or an allocation, so
//! `munmap`/`madvise` from unrelated threads never wait on the loader.

mod lifecycle;
mod range;

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use libc::{c_int, c_long, c_void, off_t, size_t, FILE};
use parking_lot::RwLock;
use thiserror::Error;

use crate::error::ShimError;
use crate::errno;
use crate::mapping::{compute_alignment, plan_mapping, ActiveMapping, Alignment, ReleaseTracker};
use crate::registry::RealIo;
use crate::telemetry::{ShimSpan, SpanExt};

pub use lifecycle::{Lifecycle, LifecycleState};
pub use range::{EmbeddedRange, RangeError};

/// Descriptor reported by `fileno` for the virtual handle. Never a real fd.
pub const SENTINEL_FD: c_int = 0x7FFF_B10B;

/// Misuse of the virtual file that cannot be reported through a return code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("Virtual file already constructed (state: {})", state.as_str())]
    AlreadyConstructed { state: LifecycleState },

    #[error("mmap of the virtual file at non-zero offset {0}")]
    NonZeroMapOffset(i64),

    #[error("Virtual file already mapped at {0:#x}")]
    MappingActive(usize),

    #[error("mmap length {requested} exceeds blob length {available}")]
    MapBeyondRange { requested: u64, available: u64 },

    #[error("MAP_FIXED is not supported for the virtual file")]
    FixedMapping,

    #[error("Concurrent mmap of the virtual file")]
    ConcurrentAccess,

    #[error("Page size {0} is not a power of two")]
    InvalidPageSize(u64),
}

/// Which real call a companion request forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Companion {
    Madvise(c_int),
    Munmap,
    Mlock,
    Munlock,
}

impl Companion {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Madvise(_) => "madvise",
            Self::Munmap => "munmap",
            Self::Mlock => "mlock",
            Self::Munlock => "munlock",
        }
    }
}

/// The live mapping and which of its pages the kernel still holds.
#[derive(Debug)]
struct Mapped {
    mapping: ActiveMapping,
    pages: ReleaseTracker,
}

#[derive(Debug, Default)]
struct MappingSlot {
    /// A real `mmap` for the virtual file is in flight.
    pending: bool,
    active: Option<Mapped>,
}

pub struct VirtualFile<I: RealIo> {
    io: I,
    stream: *mut FILE,
    range: EmbeddedRange,
    page_size: u64,
    alignment: Alignment,
    mapping: RwLock<MappingSlot>,
    lifecycle: &'static Lifecycle,
}

// SAFETY: the stream pointer is owned exclusively by this value and only
// touched through `io`; the mapping slot is behind a lock. Callers are still
// expected to drive the file from a single loader thread.
unsafe impl<I: RealIo + Send> Send for VirtualFile<I> {}
unsafe impl<I: RealIo + Sync> Sync for VirtualFile<I> {}

impl<I: RealIo> VirtualFile<I> {
    /// Open the container through `io` and position it at logical offset 0.
    ///
    /// `lifecycle` is taken for good: any later call with the same guard
    /// fails with [`ContractViolation::AlreadyConstructed`].
    pub fn open(
        lifecycle: &'static Lifecycle,
        io: I,
        container_path: &Path,
        range: EmbeddedRange,
        page_size: u64,
    ) -> Result<Self, ShimError> {
        lifecycle.begin()?;
        let span = ShimSpan::open(container_path, range.lower(), range.len());
        let _enter = span.enter();

        let result = Self::open_stream(&io, container_path, &range, page_size);
        span.record_result(&result);
        match result {
            Ok(stream) => {
                lifecycle.mark_open();
                let alignment = compute_alignment(range.lower(), page_size);
                tracing::info!(
                    lower = range.lower(),
                    upper = range.upper(),
                    page_size,
                    alignment_offset = alignment.remainder,
                    "Virtual file open"
                );
                Ok(Self {
                    io,
                    stream,
                    range,
                    page_size,
                    alignment,
                    mapping: RwLock::new(MappingSlot::default()),
                    lifecycle,
                })
            }
            Err(e) => {
                lifecycle.mark_failed();
                Err(e)
            }
        }
    }

    fn open_stream(
        io: &I,
        container_path: &Path,
        range: &EmbeddedRange,
        page_size: u64,
    ) -> Result<*mut FILE, ShimError> {
        if !page_size.is_power_of_two() {
            return Err(ContractViolation::InvalidPageSize(page_size).into());
        }
        let open_err = |source| ShimError::ContainerOpen {
            path: container_path.to_path_buf(),
            source,
        };
        let c_path = CString::new(container_path.as_os_str().as_bytes())
            .map_err(|e| open_err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        let lower = c_long::try_from(range.lower())
            .map_err(|_| open_err(std::io::Error::from_raw_os_error(libc::EOVERFLOW)))?;

        // SAFETY: both strings are NUL-terminated and outlive the call.
        let stream = unsafe { io.fopen(c_path.as_ptr(), c"rb".as_ptr()) };
        if stream.is_null() {
            return Err(open_err(std::io::Error::last_os_error()));
        }
        // SAFETY: stream was just returned by a successful fopen.
        if unsafe { io.fseek(stream, lower, libc::SEEK_SET) } != 0 {
            let err = std::io::Error::last_os_error();
            // SAFETY: stream is open and not shared yet.
            unsafe { io.fclose(stream) };
            return Err(open_err(err));
        }
        Ok(stream)
    }

    /// The retained real handle; also the identity the dispatcher compares.
    pub fn stream(&self) -> *mut FILE {
        self.stream
    }

    pub fn range(&self) -> EmbeddedRange {
        self.range
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// `lower mod page_size` split.
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Logical cursor: real position minus `lower`.
    pub fn tell(&self) -> c_long {
        // SAFETY: stream stays open while self is alive.
        let physical = unsafe { self.io.ftell(self.stream) };
        if physical < 0 {
            return physical;
        }
        self.range.to_logical(physical as i64) as c_long
    }

    /// Seek in logical coordinates.
    ///
    /// `SEEK_SET` is bounds-checked against `[0, len]`; `SEEK_END` lands on
    /// `upper` whatever the offset; `SEEK_CUR` forwards the raw delta without
    /// a bounds check.
    pub fn seek(&self, offset: c_long, whence: c_int) -> c_int {
        match whence {
            libc::SEEK_SET => {
                let physical = self
                    .range
                    .to_physical(offset as i64)
                    .and_then(|p| c_long::try_from(p).ok());
                match physical {
                    // SAFETY: stream stays open while self is alive.
                    Some(physical) => unsafe { self.io.fseek(self.stream, physical, libc::SEEK_SET) },
                    None => {
                        tracing::debug!(offset, len = self.range.len(), "Rejected out-of-range seek");
                        errno::set(libc::EINVAL);
                        -1
                    }
                }
            }
            libc::SEEK_END => {
                if offset != 0 {
                    tracing::debug!(offset, "Ignoring offset on SEEK_END");
                }
                match c_long::try_from(self.range.upper()) {
                    // SAFETY: stream stays open while self is alive.
                    Ok(upper) => unsafe { self.io.fseek(self.stream, upper, libc::SEEK_SET) },
                    Err(_) => {
                        errno::set(libc::EOVERFLOW);
                        -1
                    }
                }
            }
            // SAFETY: stream stays open while self is alive.
            libc::SEEK_CUR => unsafe { self.io.fseek(self.stream, offset, libc::SEEK_CUR) },
            _ => {
                errno::set(libc::EINVAL);
                -1
            }
        }
    }

    /// Read from the current position.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `size * nitems` bytes.
    pub unsafe fn read(&self, ptr: *mut c_void, size: size_t, nitems: size_t) -> size_t {
        self.io.fread(ptr, size, nitems, self.stream)
    }

    /// The underlying handle is healthy by construction.
    pub fn error(&self) -> c_int {
        0
    }

    pub fn descriptor(&self) -> c_int {
        SENTINEL_FD
    }

    /// Return to logical offset 0.
    pub fn rewind(&self) -> c_int {
        self.seek(0, libc::SEEK_SET)
    }

    /// Hand the retained stream out again at logical offset 0.
    ///
    /// Null, with errno from the failed seek, if the rewind fails.
    pub fn reopen(&self) -> *mut FILE {
        if self.rewind() != 0 {
            return std::ptr::null_mut();
        }
        self.stream
    }

    /// Fill `buf` from logical offset `logical`.
    pub fn read_exact_at(&self, logical: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let offset = c_long::try_from(logical)
            .map_err(|_| std::io::Error::from_raw_os_error(libc::EOVERFLOW))?;
        if self.seek(offset, libc::SEEK_SET) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = &mut buf[filled..];
            // SAFETY: remaining is a valid writable slice of the given length.
            let n = unsafe { self.read(remaining.as_mut_ptr().cast(), 1, remaining.len()) };
            if n == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            filled += n;
        }
        Ok(())
    }

    pub fn active_mapping(&self) -> Option<ActiveMapping> {
        self.mapping.read().active.as_ref().map(|m| m.mapping)
    }

    /// Whether `addr` is caller-visible in the active mapping and its page
    /// has not been released yet.
    pub fn owns_address(&self, addr: *const c_void) -> bool {
        self.mapping
            .read()
            .active
            .as_ref()
            .is_some_and(|m| m.pages.owns(addr as usize))
    }

    /// Map the whole blob from logical offset 0.
    ///
    /// Returns the caller-visible base, or `MAP_FAILED` when the real `mmap`
    /// fails (errno untouched) or `len` is zero (`EINVAL`).
    ///
    /// # Safety
    /// Same contract as `mmap(2)`.
    pub unsafe fn mmap(
        &self,
        addr: *mut c_void,
        len: size_t,
        prot: c_int,
        flags: c_int,
        offset: off_t,
    ) -> Result<*mut c_void, ContractViolation> {
        if offset != 0 {
            return Err(ContractViolation::NonZeroMapOffset(offset as i64));
        }
        if flags & libc::MAP_FIXED != 0 {
            return Err(ContractViolation::FixedMapping);
        }
        if len == 0 {
            errno::set(libc::EINVAL);
            return Ok(libc::MAP_FAILED);
        }
        let beyond = ContractViolation::MapBeyondRange {
            requested: len as u64,
            available: self.range.len(),
        };
        if len as u64 > self.range.len() {
            return Err(beyond);
        }
        let request = plan_mapping(self.range.lower(), len, self.page_size).ok_or(beyond.clone())?;
        let aligned_offset = off_t::try_from(request.aligned_offset).map_err(|_| beyond)?;

        {
            let mut slot = self.mapping.write();
            if let Some(active) = &slot.active {
                return Err(ContractViolation::MappingActive(active.mapping.caller_base()));
            }
            if slot.pending {
                return Err(ContractViolation::ConcurrentAccess);
            }
            slot.pending = true;
        }

        let span = errno::preserve(|| {
            ShimSpan::mmap(len, self.page_size, self.alignment.remainder)
        });
        let _enter = span.enter();

        let fd = self.io.fileno(self.stream);
        let real = self
            .io
            .mmap(addr, request.real_length, prot, flags, fd, aligned_offset);
        if real == libc::MAP_FAILED {
            self.mapping.write().pending = false;
            errno::preserve(|| {
                let err = std::io::Error::last_os_error();
                span.record_result::<(), _>(&Err(err));
            });
            return Ok(real);
        }

        let mapping = ActiveMapping::new(real as usize, &request, self.page_size as usize);
        let pages = errno::preserve(|| ReleaseTracker::new(&mapping, self.page_size as usize));
        {
            let mut slot = self.mapping.write();
            slot.pending = false;
            slot.active = Some(Mapped { mapping, pages });
        }
        errno::preserve(|| {
            span.record_result::<(), String>(&Ok(()));
            tracing::info!(
                real_base = format_args!("{:#x}", mapping.real_base()),
                caller_base = format_args!("{:#x}", mapping.caller_base()),
                len,
                alignment_offset = request.remainder,
                "Virtual file mapped"
            )
        });
        Ok(mapping.caller_base() as *mut c_void)
    }

    /// Forward a companion call, moving addresses inside the active mapping
    /// onto the real, page-aligned mapping.
    ///
    /// Addresses outside the mapping, or in pages already released, are
    /// forwarded untouched.
    ///
    /// # Safety
    /// Same contract as the corresponding libc call.
    pub unsafe fn companion(&self, call: Companion, addr: *mut c_void, len: size_t) -> c_int {
        let owned = {
            let slot = self.mapping.read();
            slot.active
                .as_ref()
                .filter(|m| m.pages.owns(addr as usize))
                .map(|m| m.mapping)
        };
        let Some(active) = owned else {
            return self.forward(call, addr, len);
        };
        if call == Companion::Munmap {
            return self.release(addr as usize, len);
        }

        let real = active.translate(addr as usize, len);
        errno::preserve(|| {
            tracing::debug!(
                call = call.name(),
                addr = format_args!("{:#x}", addr as usize),
                real_addr = format_args!("{:#x}", real.addr),
                real_len = real.len,
                "Translated companion call"
            )
        });
        if real.is_empty() {
            return 0;
        }
        self.forward(call, real.addr as *mut c_void, real.len)
    }

    /// Unmap every real page the caller has now fully released.
    unsafe fn release(&self, addr: usize, len: usize) -> c_int {
        let span = {
            let mut slot = self.mapping.write();
            slot.active.as_mut().and_then(|m| m.pages.cover(addr, len))
        };
        let Some(mut span) = span else {
            return 0;
        };

        let mut rc = 0;
        loop {
            let run = {
                let mut slot = self.mapping.write();
                slot.active.as_mut().and_then(|m| m.pages.take_run(&mut span))
            };
            let Some(run) = run else {
                break;
            };
            let out = self.io.munmap(run.addr as *mut c_void, run.len);
            errno::preserve(|| {
                tracing::debug!(
                    addr = format_args!("{:#x}", addr),
                    real_addr = format_args!("{:#x}", run.addr),
                    real_len = run.len,
                    rc = out,
                    "Released virtual pages"
                )
            });
            if out != 0 {
                rc = out;
            }
        }

        let finished = {
            let mut slot = self.mapping.write();
            if slot.active.as_ref().is_some_and(|m| m.pages.is_released()) {
                slot.active.take()
            } else {
                None
            }
        };
        if let Some(done) = finished {
            errno::preserve(|| {
                tracing::info!(
                    caller_base = format_args!("{:#x}", done.mapping.caller_base()),
                    "Virtual mapping released"
                );
                drop(done);
            });
        }
        rc
    }

    unsafe fn forward(&self, call: Companion, addr: *mut c_void, len: size_t) -> c_int {
        match call {
            Companion::Madvise(advice) => self.io.madvise(addr, len, advice),
            Companion::Munmap => self.io.munmap(addr, len),
            Companion::Mlock => self.io.mlock(addr, len),
            Companion::Munlock => self.io.munlock(addr, len),
        }
    }

    /// Release the real handle. Only the first call has any effect.
    pub fn close(&self) {
        if self.lifecycle.mark_closed() {
            // SAFETY: the transition above guarantees this runs once.
            unsafe { self.io.fclose(self.stream) };
            tracing::debug!("Virtual file closed");
        }
    }
}

impl<I: RealIo> Drop for VirtualFile<I> {
    fn drop(&mut self) {
        self.close();
    }
}
