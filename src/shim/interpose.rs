// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! dyld interposition table.
//!
//! dyld reads `(replacement, replacee)` pairs from `__DATA,__interpose` of
//! every image loaded through `DYLD_INSERT_LIBRARIES` and rebinds all other
//! images. The inserting image itself is not rebound, so `dlsym(RTLD_NEXT, ..)`
//! from here still reaches libSystem.

use super::{
    blobshim_fclose, blobshim_ferror, blobshim_fileno, blobshim_fopen, blobshim_fread,
    blobshim_fseek, blobshim_ftell, blobshim_madvise, blobshim_mlock, blobshim_mmap,
    blobshim_munlock, blobshim_munmap,
};

#[repr(C)]
pub struct Interpose {
    pub new_func: *const (),
    pub old_func: *const (),
}

unsafe impl Sync for Interpose {}

macro_rules! interpose {
    ($slot:ident, $shim:ident, $original:path) => {
        #[link_section = "__DATA,__interpose"]
        #[used]
        pub static $slot: Interpose = Interpose {
            new_func: $shim as _,
            old_func: $original as _,
        };
    };
}

interpose!(IT_FOPEN, blobshim_fopen, libc::fopen);
interpose!(IT_FCLOSE, blobshim_fclose, libc::fclose);
interpose!(IT_FTELL, blobshim_ftell, libc::ftell);
interpose!(IT_FSEEK, blobshim_fseek, libc::fseek);
interpose!(IT_FREAD, blobshim_fread, libc::fread);
interpose!(IT_FERROR, blobshim_ferror, libc::ferror);
interpose!(IT_FILENO, blobshim_fileno, libc::fileno);
interpose!(IT_MMAP, blobshim_mmap, libc::mmap);
interpose!(IT_MADVISE, blobshim_madvise, libc::madvise);
interpose!(IT_MUNMAP, blobshim_munmap, libc::munmap);
interpose!(IT_MLOCK, blobshim_mlock, libc::mlock);
interpose!(IT_MUNLOCK, blobshim_munlock, libc::munlock);
