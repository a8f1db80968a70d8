// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! Symbol interception registry.
//!
//! Records, for every intercepted libc entry point, the shim that replaces it
//! and the original implementation that pass-through calls must reach. The
//! table is built once and never mutated afterwards.
//!
//! Resolution is injectable through [`SymbolResolver`]: the preload library
//! uses [`DlsymResolver`] (`dlsym(RTLD_NEXT, ..)`), tests and the CLI use a
//! [`StaticResolver`] that never asks the dynamic loader for anything.

mod originals;

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::OnceLock;

use libc::c_void;
use thiserror::Error;

pub use originals::{Originals, RealIo};

/// Entry points replaced by the shim layer.
pub const INTERCEPTED: [&str; 12] = [
    "fopen", "fclose", "ftell", "fseek", "fread", "ferror", "fileno", "mmap", "madvise",
    "munmap", "mlock", "munlock",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Original for {0} resolves back to its own shim")]
    SelfReference(String),

    #[error("Symbol bound twice: {0}")]
    Duplicate(String),

    #[error("Invalid symbol name: {0}")]
    InvalidName(String),
}

/// Looks up the original implementation of a symbol.
pub trait SymbolResolver {
    fn resolve(&self, name: &str) -> Option<*const c_void>;
}

/// Resolves the next definition after the calling object (`RTLD_NEXT`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DlsymResolver;

impl SymbolResolver for DlsymResolver {
    fn resolve(&self, name: &str) -> Option<*const c_void> {
        let c_name = CString::new(name).ok()?;
        // SAFETY: dlsym only reads the NUL-terminated name.
        let symbol = unsafe { libc::dlsym(libc::RTLD_NEXT, c_name.as_ptr()) };
        if symbol.is_null() {
            None
        } else {
            Some(symbol as *const c_void)
        }
    }
}

/// Fixed name to address map.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    symbols: HashMap<String, usize>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, addr: *const c_void) -> Self {
        self.symbols.insert(name.to_string(), addr as usize);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.symbols.remove(name);
        self
    }

    /// Map every intercepted name to the libc function this crate links
    /// against.
    ///
    /// Only meaningful when the exported shims are not compiled in, because a
    /// preload build would hand back its own shims here.
    #[cfg(not(feature = "preload"))]
    pub fn linked_libc() -> Self {
        Self::new()
            .with("fopen", libc::fopen as *const c_void)
            .with("fclose", libc::fclose as *const c_void)
            .with("ftell", libc::ftell as *const c_void)
            .with("fseek", libc::fseek as *const c_void)
            .with("fread", libc::fread as *const c_void)
            .with("ferror", libc::ferror as *const c_void)
            .with("fileno", libc::fileno as *const c_void)
            .with("mmap", libc::mmap as *const c_void)
            .with("madvise", libc::madvise as *const c_void)
            .with("munmap", libc::munmap as *const c_void)
            .with("mlock", libc::mlock as *const c_void)
            .with("munlock", libc::munlock as *const c_void)
    }
}

impl SymbolResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Option<*const c_void> {
        self.symbols.get(name).map(|addr| *addr as *const c_void)
    }
}

/// `(name, shim, original)` recorded at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolBinding {
    pub name: &'static str,
    pub shim: *const c_void,
    pub original: *const c_void,
}

// SAFETY: bindings hold code addresses only; they are never dereferenced as
// data and never change after install.
unsafe impl Send for SymbolBinding {}
unsafe impl Sync for SymbolBinding {}

/// Name-keyed table of bindings.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    bindings: HashMap<&'static str, SymbolBinding>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<&SymbolBinding> {
        self.bindings.get(name)
    }

    /// Original implementation for `name`.
    pub fn original(&self, name: &str) -> Option<*const c_void> {
        self.bindings.get(name).map(|b| b.original)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bindings.keys().copied()
    }
}

/// Resolve the original for every `(name, shim)` pair.
pub fn install(
    resolver: &dyn SymbolResolver,
    bindings: &[(&'static str, *const c_void)],
) -> Result<SymbolTable, InstallError> {
    let mut table = SymbolTable::default();
    for &(name, shim) in bindings {
        if name.is_empty() || name.contains('\0') {
            return Err(InstallError::InvalidName(name.to_string()));
        }
        if table.bindings.contains_key(name) {
            return Err(InstallError::Duplicate(name.to_string()));
        }
        let original = resolver
            .resolve(name)
            .ok_or_else(|| InstallError::SymbolNotFound(name.to_string()))?;
        if original == shim {
            return Err(InstallError::SelfReference(name.to_string()));
        }
        table.bindings.insert(
            name,
            SymbolBinding {
                name,
                shim,
                original,
            },
        );
    }
    tracing::debug!(symbols = table.len(), "Symbol table installed");
    Ok(table)
}

/// Bindings for a process that installs no shims of its own (CLI, tests).
///
/// Every name gets a null shim, so only the resolved originals matter.
pub fn unshimmed_bindings() -> [(&'static str, *const c_void); 12] {
    INTERCEPTED.map(|name| (name, std::ptr::null()))
}

/// Installed table plus its typed view.
#[derive(Debug)]
pub struct Registry {
    table: SymbolTable,
    originals: Originals,
}

impl Registry {
    pub fn install(
        resolver: &dyn SymbolResolver,
        bindings: &[(&'static str, *const c_void)],
    ) -> Result<Self, InstallError> {
        let table = install(resolver, bindings)?;
        let originals = Originals::from_table(&table)?;
        Ok(Self { table, originals })
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn originals(&self) -> &Originals {
        &self.originals
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Install the process-wide registry, or return the one already installed.
pub fn install_global(
    resolver: &dyn SymbolResolver,
    bindings: &[(&'static str, *const c_void)],
) -> Result<&'static Registry, InstallError> {
    if let Some(registry) = REGISTRY.get() {
        return Ok(registry);
    }
    let registry = Registry::install(resolver, bindings)?;
    Ok(REGISTRY.get_or_init(|| registry))
}

/// The process-wide registry, if installed.
pub fn global() -> Option<&'static Registry> {
    REGISTRY.get()
}
