// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Thread-local `errno` access.
//!
//! Shims that log after a failed pass-through call must hand the caller the
//! errno of the real call, not whatever the logger left behind.

use libc::c_int;

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn location() -> *mut c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
unsafe fn location() -> *mut c_int {
    libc::__error()
}

/// Current value of `errno`.
pub fn get() -> c_int {
    // SAFETY: the errno location is valid for the lifetime of the thread.
    unsafe { *location() }
}

/// Overwrite `errno`.
pub fn set(value: c_int) {
    // SAFETY: the errno location is valid for the lifetime of the thread.
    unsafe { *location() = value }
}

/// Run `f` and restore the errno observed before it ran.
pub fn preserve<T>(f: impl FnOnce() -> T) -> T {
    let saved = get();
    let out = f();
    set(saved);
    out
}
