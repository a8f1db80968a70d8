// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed view over the original implementations.

use libc::{c_char, c_int, c_long, c_void, off_t, size_t, FILE};

use super::{InstallError, SymbolTable};

type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut FILE;
type FcloseFn = unsafe extern "C" fn(*mut FILE) -> c_int;
type FtellFn = unsafe extern "C" fn(*mut FILE) -> c_long;
type FseekFn = unsafe extern "C" fn(*mut FILE, c_long, c_int) -> c_int;
type FreadFn = unsafe extern "C" fn(*mut c_void, size_t, size_t, *mut FILE) -> size_t;
type FerrorFn = unsafe extern "C" fn(*mut FILE) -> c_int;
type FilenoFn = unsafe extern "C" fn(*mut FILE) -> c_int;
type MmapFn = unsafe extern "C" fn(*mut c_void, size_t, c_int, c_int, c_int, off_t) -> *mut c_void;
type MadviseFn = unsafe extern "C" fn(*mut c_void, size_t, c_int) -> c_int;
type MunmapFn = unsafe extern "C" fn(*mut c_void, size_t) -> c_int;
type MlockFn = unsafe extern "C" fn(*const c_void, size_t) -> c_int;
type MunlockFn = unsafe extern "C" fn(*const c_void, size_t) -> c_int;

/// The real I/O surface underneath the virtual file.
///
/// # Safety
/// Every method has the contract of the libc function of the same name.
pub trait RealIo {
    unsafe fn fopen(&self, path: *const c_char, mode: *const c_char) -> *mut FILE;
    unsafe fn fclose(&self, stream: *mut FILE) -> c_int;
    unsafe fn ftell(&self, stream: *mut FILE) -> c_long;
    unsafe fn fseek(&self, stream: *mut FILE, offset: c_long, whence: c_int) -> c_int;
    unsafe fn fread(&self, ptr: *mut c_void, size: size_t, nitems: size_t, stream: *mut FILE)
        -> size_t;
    unsafe fn ferror(&self, stream: *mut FILE) -> c_int;
    unsafe fn fileno(&self, stream: *mut FILE) -> c_int;
    unsafe fn mmap(
        &self,
        addr: *mut c_void,
        len: size_t,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: off_t,
    ) -> *mut c_void;
    unsafe fn madvise(&self, addr: *mut c_void, len: size_t, advice: c_int) -> c_int;
    unsafe fn munmap(&self, addr: *mut c_void, len: size_t) -> c_int;
    unsafe fn mlock(&self, addr: *const c_void, len: size_t) -> c_int;
    unsafe fn munlock(&self, addr: *const c_void, len: size_t) -> c_int;
}

impl<T: RealIo + ?Sized> RealIo for &T {
    unsafe fn fopen(&self, path: *const c_char, mode: *const c_char) -> *mut FILE {
        (**self).fopen(path, mode)
    }
    unsafe fn fclose(&self, stream: *mut FILE) -> c_int {
        (**self).fclose(stream)
    }
    unsafe fn ftell(&self, stream: *mut FILE) -> c_long {
        (**self).ftell(stream)
    }
    unsafe fn fseek(&self, stream: *mut FILE, offset: c_long, whence: c_int) -> c_int {
        (**self).fseek(stream, offset, whence)
    }
    unsafe fn fread(&self, ptr: *mut c_void, size: size_t, nitems: size_t, stream: *mut FILE)
        -> size_t {
        (**self).fread(ptr, size, nitems, stream)
    }
    unsafe fn ferror(&self, stream: *mut FILE) -> c_int {
        (**self).ferror(stream)
    }
    unsafe fn fileno(&self, stream: *mut FILE) -> c_int {
        (**self).fileno(stream)
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
        (**self).mmap(addr, len, prot, flags, fd, offset)
    }
    unsafe fn madvise(&self, addr: *mut c_void, len: size_t, advice: c_int) -> c_int {
        (**self).madvise(addr, len, advice)
    }
    unsafe fn munmap(&self, addr: *mut c_void, len: size_t) -> c_int {
        (**self).munmap(addr, len)
    }
    unsafe fn mlock(&self, addr: *const c_void, len: size_t) -> c_int {
        (**self).mlock(addr, len)
    }
    unsafe fn munlock(&self, addr: *const c_void, len: size_t) -> c_int {
        (**self).munlock(addr, len)
    }
}

/// Original implementations resolved from a [`SymbolTable`].
#[derive(Debug, Clone, Copy)]
pub struct Originals {
    fopen: FopenFn,
    fclose: FcloseFn,
    ftell: FtellFn,
    fseek: FseekFn,
    fread: FreadFn,
    ferror: FerrorFn,
    fileno: FilenoFn,
    mmap: MmapFn,
    madvise: MadviseFn,
    munmap: MunmapFn,
    mlock: MlockFn,
    munlock: MunlockFn,
}

macro_rules! original {
    ($table:expr, $name:literal, $ty:ty) => {{
        let addr = $table
            .original($name)
            .ok_or_else(|| InstallError::SymbolNotFound($name.to_string()))?;
        // SAFETY: the resolver returned the address of the libc function
        // named $name, whose signature is $ty.
        unsafe { std::mem::transmute::<*const c_void, $ty>(addr) }
    }};
}

impl Originals {
    pub fn from_table(table: &SymbolTable) -> Result<Self, InstallError> {
        Ok(Self {
            fopen: original!(table, "fopen", FopenFn),
            fclose: original!(table, "fclose", FcloseFn),
            ftell: original!(table, "ftell", FtellFn),
            fseek: original!(table, "fseek", FseekFn),
            fread: original!(table, "fread", FreadFn),
            ferror: original!(table, "ferror", FerrorFn),
            fileno: original!(table, "fileno", FilenoFn),
            mmap: original!(table, "mmap", MmapFn),
            madvise: original!(table, "madvise", MadviseFn),
            munmap: original!(table, "munmap", MunmapFn),
            mlock: original!(table, "mlock", MlockFn),
            munlock: original!(table, "munlock", MunlockFn),
        })
    }
}

impl RealIo for Originals {
    unsafe fn fopen(&self, path: *const c_char, mode: *const c_char) -> *mut FILE {
        (self.fopen)(path, mode)
    }
    unsafe fn fclose(&self, stream: *mut FILE) -> c_int {
        (self.fclose)(stream)
    }
    unsafe fn ftell(&self, stream: *mut FILE) -> c_long {
        (self.ftell)(stream)
    }
    unsafe fn fseek(&self, stream: *mut FILE, offset: c_long, whence: c_int) -> c_int {
        (self.fseek)(stream, offset, whence)
    }
    unsafe fn fread(&self, ptr: *mut c_void, size: size_t, nitems: size_t, stream: *mut FILE)
        -> size_t {
        (self.fread)(ptr, size, nitems, stream)
    }
    unsafe fn ferror(&self, stream: *mut FILE) -> c_int {
        (self.ferror)(stream)
    }
    unsafe fn fileno(&self, stream: *mut FILE) -> c_int {
        (self.fileno)(stream)
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
        (self.mmap)(addr, len, prot, flags, fd, offset)
    }
    unsafe fn madvise(&self, addr: *mut c_void, len: size_t, advice: c_int) -> c_int {
        (self.madvise)(addr, len, advice)
    }
    unsafe fn munmap(&self, addr: *mut c_void, len: size_t) -> c_int {
        (self.munmap)(addr, len)
    }
    unsafe fn mlock(&self, addr: *const c_void, len: size_t) -> c_int {
        (self.mlock)(addr, len)
    }
    unsafe fn munlock(&self, addr: *const c_void, len: size_t) -> c_int {
        (self.munlock)(addr, len)
    }
}
