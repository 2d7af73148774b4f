use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{BoundSymbol, LibraryHandle, LoaderError, SymbolLoader};

/// An in-memory [`SymbolLoader`] for tests and hosts that want to exercise
/// the engine without shipping real shared libraries. Libraries and
/// symbols are registered ahead of time by path/name.
#[derive(Default)]
pub struct MockSymbolLoader {
    libraries: Mutex<HashMap<PathBuf, HashMap<String, BoundSymbol>>>,
}

struct OpenLibrary(PathBuf);

impl MockSymbolLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol for a (not-yet-necessarily-opened) library path.
    pub fn register<F>(&self, path: impl Into<PathBuf>, symbol: impl Into<String>, f: F)
    where
        F: Fn() -> i32 + Send + Sync + 'static,
    {
        let mut libraries = self.libraries.lock().unwrap();
        libraries
            .entry(path.into())
            .or_default()
            .insert(symbol.into(), Arc::new(f));
    }
}

impl SymbolLoader for MockSymbolLoader {
    fn open(&self, path: &Path) -> Result<LibraryHandle, LoaderError> {
        let libraries = self.libraries.lock().unwrap();
        if !libraries.contains_key(path) {
            return Err(LoaderError::Open {
                path: path.to_path_buf(),
                reason: "no such registered mock library".to_string(),
            });
        }
        Ok(LibraryHandle(Box::new(OpenLibrary(path.to_path_buf()))))
    }

    fn resolve(&self, lib: &LibraryHandle, symbol: &str) -> Result<BoundSymbol, LoaderError> {
        let open = lib
            .0
            .downcast_ref::<OpenLibrary>()
            .expect("LibraryHandle produced by a different SymbolLoader");
        let libraries = self.libraries.lock().unwrap();
        libraries
            .get(&open.0)
            .and_then(|symbols| symbols.get(symbol))
            .cloned()
            .ok_or_else(|| LoaderError::SymbolMissing {
                path: open.0.clone(),
                symbol: symbol.to_string(),
            })
    }

    fn close(&self, _lib: LibraryHandle) {}
}
