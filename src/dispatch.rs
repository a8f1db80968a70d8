// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Routing of intercepted calls.
//!
//! Every shim first asks the dispatcher whether its argument names the
//! virtual file. Identity is decided by comparison only: the sentinel path
//! by bytes, the stream by pointer, the descriptor by value, an address by
//! range.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use libc::{c_int, c_void, FILE};

use crate::registry::RealIo;
use crate::vfile::VirtualFile;

/// Where an intercepted call goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Virtual,
    PassThrough,
}

/// What the dispatcher needs to know about the virtual file.
pub trait VirtualTarget {
    fn owns_stream(&self, stream: *mut FILE) -> bool;
    fn owns_descriptor(&self, fd: c_int) -> bool;
    /// Never fails and never waits on a mapping in flight: addresses that
    /// are not the virtual file's must always pass through.
    fn owns_address(&self, addr: *const c_void) -> bool;
}

impl<I: RealIo> VirtualTarget for VirtualFile<I> {
    fn owns_stream(&self, stream: *mut FILE) -> bool {
        !stream.is_null() && stream == self.stream()
    }

    fn owns_descriptor(&self, fd: c_int) -> bool {
        fd == self.descriptor()
    }

    fn owns_address(&self, addr: *const c_void) -> bool {
        VirtualFile::owns_address(self, addr)
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    sentinel: CString,
}

impl Dispatcher {
    pub fn new(sentinel_path: &Path) -> Option<Self> {
        CString::new(sentinel_path.as_os_str().as_bytes())
            .ok()
            .map(|sentinel| Self { sentinel })
    }

    pub fn sentinel(&self) -> &CStr {
        &self.sentinel
    }

    /// Route an `fopen` path. Exact byte comparison, no normalization.
    ///
    /// # Safety
    /// `path` must be null or point to a NUL-terminated string.
    pub unsafe fn route_path(&self, path: *const libc::c_char) -> Route {
        if path.is_null() {
            return Route::PassThrough;
        }
        if CStr::from_ptr(path) == self.sentinel.as_c_str() {
            Route::Virtual
        } else {
            Route::PassThrough
        }
    }

    pub fn route_stream<T: VirtualTarget>(&self, target: Option<&T>, stream: *mut FILE) -> Route {
        match target {
            Some(t) if t.owns_stream(stream) => Route::Virtual,
            _ => Route::PassThrough,
        }
    }

    pub fn route_descriptor<T: VirtualTarget>(&self, target: Option<&T>, fd: c_int) -> Route {
        match target {
            Some(t) if t.owns_descriptor(fd) => Route::Virtual,
            _ => Route::PassThrough,
        }
    }

    pub fn route_address<T: VirtualTarget>(&self, target: Option<&T>, addr: *const c_void) -> Route {
        match target {
            Some(t) if t.owns_address(addr) => Route::Virtual,
            _ => Route::PassThrough,
        }
    }
}
