//! Real `dlopen`/`dlsym`-backed [`SymbolLoader`], gated behind the
//! `native` feature. Grounded on the drasi-server dynamic plug-in loading
//! module's `libloading`-based open/resolve/close shape.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::{BoundSymbol, LibraryHandle, LoaderError, SymbolLoader};

/// Loads a plug-in's runtime library via `libloading`. Each resolved
/// [`BoundSymbol`] keeps the owning `Library` alive via a shared `Arc`, so
/// the library stays mapped for as long as any symbol resolved from it
/// might still be invoked, even after [`SymbolLoader::close`] drops the
/// loader's own reference.
#[derive(Default)]
pub struct NativeSymbolLoader;

impl NativeSymbolLoader {
    pub fn new() -> Self {
        Self
    }
}

struct OpenLibrary {
    path: PathBuf,
    library: Arc<Library>,
}

type StartStopFn = unsafe extern "C" fn() -> i32;

impl SymbolLoader for NativeSymbolLoader {
    fn open(&self, path: &Path) -> Result<LibraryHandle, LoaderError> {
        // Safety: running a plug-in's initializer/finalizer code at
        // load/unload time is inherent to dynamic loading; the engine
        // trusts the runtime libraries a host has chosen to scan.
        let library = unsafe { Library::new(path) }.map_err(|e| LoaderError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(LibraryHandle(Box::new(OpenLibrary {
            path: path.to_path_buf(),
            library: Arc::new(library),
        })))
    }

    fn resolve(&self, lib: &LibraryHandle, symbol: &str) -> Result<BoundSymbol, LoaderError> {
        let open = lib
            .0
            .downcast_ref::<OpenLibrary>()
            .expect("LibraryHandle produced by a different SymbolLoader");

        // Resolve once up front so a missing symbol is reported at
        // resolve time rather than on first invocation.
        unsafe { open.library.get::<StartStopFn>(symbol.as_bytes()) }.map_err(|_| {
            LoaderError::SymbolMissing {
                path: open.path.clone(),
                symbol: symbol.to_string(),
            }
        })?;

        let library = open.library.clone();
        let symbol_name = symbol.as_bytes().to_vec();
        Ok(Arc::new(move || {
            // Safety: presence of `symbol_name` in `library` was already
            // confirmed above; `library` is kept alive for as long as this
            // closure lives.
            let func: Symbol<StartStopFn> = unsafe { library.get(&symbol_name) }
                .expect("symbol presence was already checked in resolve");
            unsafe { func() }
        }))
    }

    fn close(&self, _lib: LibraryHandle) {}
}
