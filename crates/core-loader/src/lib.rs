//! External collaborator traits the plug-in lifecycle engine depends on
//! but does not itself implement to any sophisticated degree: turning a
//! directory into a [`core_descriptor::Descriptor`], and turning a
//! plug-in's declared runtime library + symbol names into callables the
//! engine can invoke.
//!
//! Both traits follow the same trait-boundary-plus-null-object shape as
//! the framework's own `PluginHost`/`NoopPluginHost` pair: a host (or a
//! test) can supply any implementation it likes, and this crate ships one
//! reference implementation of each so the engine is runnable without a
//! host-supplied collaborator.

mod manifest;
mod mock;
#[cfg(feature = "native")]
mod native;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_descriptor::Descriptor;

pub use manifest::{ManifestError, TomlDescriptorParser};
pub use mock::MockSymbolLoader;
#[cfg(feature = "native")]
pub use native::NativeSymbolLoader;

/// Turns a plug-in's install directory into a parsed [`Descriptor`].
pub trait DescriptorParser: Send + Sync {
    fn parse(&self, dir: &Path) -> Result<Descriptor, ParseError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed descriptor at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// A bound, callable symbol resolved from a plug-in's runtime library.
/// Start functions return a nonzero value on failure, by convention;
/// stop functions ignore their return value.
pub type BoundSymbol = Arc<dyn Fn() -> i32 + Send + Sync>;

/// An opaque handle to an open runtime library. Implementations stash
/// whatever they need to keep the library mapped for as long as any
/// [`BoundSymbol`] resolved from it might still be called.
pub struct LibraryHandle(pub Box<dyn std::any::Any + Send + Sync>);

impl std::fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LibraryHandle").finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to open runtime library {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("symbol {symbol:?} not found in runtime library {path}")]
    SymbolMissing { path: PathBuf, symbol: String },
}

/// Loads a plug-in's native runtime library and resolves named symbols
/// from it into callables the activator can invoke uniformly, whether they
/// wrap a real `dlsym`-resolved function pointer ([`NativeSymbolLoader`])
/// or a Rust closure registered for testing ([`MockSymbolLoader`]).
pub trait SymbolLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<LibraryHandle, LoaderError>;
    fn resolve(&self, lib: &LibraryHandle, symbol: &str) -> Result<BoundSymbol, LoaderError>;
    fn close(&self, lib: LibraryHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_loader_round_trip() {
        let loader = MockSymbolLoader::new();
        loader.register("libfoo.so", "foo_start", || 0);
        let lib = loader.open(Path::new("libfoo.so")).unwrap();
        let symbol = loader.resolve(&lib, "foo_start").unwrap();
        assert_eq!(symbol(), 0);
        loader.close(lib);
    }

    #[test]
    fn mock_loader_missing_symbol() {
        let loader = MockSymbolLoader::new();
        loader.register("libfoo.so", "foo_start", || 0);
        let lib = loader.open(Path::new("libfoo.so")).unwrap();
        let result = loader.resolve(&lib, "missing");
        assert!(matches!(result, Err(LoaderError::SymbolMissing { .. })));
    }

    #[test]
    fn mock_loader_unopened_library_fails() {
        let loader = MockSymbolLoader::new();
        let err = loader.open(Path::new("libunknown.so")).unwrap_err();
        assert!(matches!(err, LoaderError::Open { .. }));
    }
}
