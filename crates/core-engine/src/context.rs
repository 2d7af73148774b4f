use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_descriptor::{Descriptor, DescriptorHandle, Extension, ExtensionPoint};
use core_loader::{DescriptorParser, SymbolLoader};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::error::Error;
use crate::events::{
    EventCallback, EventListenerEntry, ListenerId, LogCallback, LoggerEntry, Severity,
};
use crate::plugin_state::{PluginState, RegisteredPlugin};
use crate::{activator, resolver, scan, uninstall};

pub(crate) struct ContextInner {
    pub(crate) plugins: HashMap<String, RegisteredPlugin>,
    pub(crate) extension_points: HashMap<String, ExtensionPoint>,
    pub(crate) extensions: HashMap<String, Vec<Extension>>,
    pub(crate) started: Vec<String>,
    pub(crate) directories: Vec<PathBuf>,
    pub(crate) start_invocations: u32,
    pub(crate) stop_invocations: u32,
}

impl ContextInner {
    fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            extension_points: HashMap::new(),
            extensions: HashMap::new(),
            started: Vec::new(),
            directories: Vec::new(),
            start_invocations: 0,
            stop_invocations: 0,
        }
    }
}

/// Everything reachable under one acquisition of a context's re-entrant
/// lock. `inner`, `listeners`, and `loggers` are separate `RefCell`s
/// (rather than one, coarser cell) so that event/log dispatch never needs
/// to hold the plugin-registry borrow.
pub(crate) struct Gate {
    pub(crate) inner: RefCell<ContextInner>,
    pub(crate) listeners: RefCell<Vec<EventListenerEntry>>,
    pub(crate) loggers: RefCell<Vec<LoggerEntry>>,
    pub(crate) loggers_min: Cell<Option<Severity>>,
}

/// An isolated registry of plug-ins, extension points, and extensions,
/// with its own re-entrant lock.
pub struct Context {
    pub(crate) descriptor_parser: Box<dyn DescriptorParser>,
    pub(crate) symbol_loader: Box<dyn SymbolLoader>,
    gate: ReentrantMutex<Gate>,
}

impl Context {
    pub fn create(
        descriptor_parser: Box<dyn DescriptorParser>,
        symbol_loader: Box<dyn SymbolLoader>,
    ) -> Arc<Context> {
        Arc::new(Context {
            descriptor_parser,
            symbol_loader,
            gate: ReentrantMutex::new(Gate {
                inner: RefCell::new(ContextInner::new()),
                listeners: RefCell::new(Vec::new()),
                loggers: RefCell::new(Vec::new()),
                loggers_min: Cell::new(None),
            }),
        })
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, Gate> {
        self.gate.lock()
    }

    pub fn add_directory(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let guard = self.lock();
        let mut inner = guard.inner.borrow_mut();
        if !inner.directories.contains(&path) {
            inner.directories.push(path);
        }
    }

    pub fn remove_directory(&self, path: &Path) {
        let guard = self.lock();
        guard.inner.borrow_mut().directories.retain(|p| p != path);
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        let guard = self.lock();
        guard.inner.borrow().directories.clone()
    }

    pub fn load_descriptor(&self, dir: &Path) -> Result<Descriptor, Error> {
        self.descriptor_parser
            .parse(dir)
            .map_err(|e| scan::parse_error_to_engine_error(dir, e))
    }

    /// Scans every configured directory for plug-in manifests and installs
    /// any not already present, applying the given scan flags. Returns a
    /// report of what happened per directory entry.
    pub fn scan(&self, flags: scan::ScanFlags) -> scan::ScanReport {
        scan::scan(self, flags)
    }

    pub fn install(&self, descriptor: Descriptor) -> Result<DescriptorHandle, Error> {
        if let Err(reason) = core_descriptor::validate_identifier(&descriptor.id) {
            return Err(Error::Malformed {
                path: descriptor.path.clone(),
                reason: reason.to_string(),
            });
        }

        let guard = self.lock();
        let mut inner = guard.inner.borrow_mut();

        if inner.plugins.contains_key(&descriptor.id) {
            return Err(Error::Conflict(format!(
                "plug-in {:?} is already installed",
                descriptor.id
            )));
        }
        for point in &descriptor.extension_points {
            if inner.extension_points.contains_key(&point.global_id) {
                return Err(Error::Conflict(format!(
                    "extension point {:?} is already registered",
                    point.global_id
                )));
            }
        }

        for point in &descriptor.extension_points {
            inner
                .extension_points
                .insert(point.global_id.clone(), point.clone());
        }
        for extension in &descriptor.extensions {
            inner
                .extensions
                .entry(extension.point_global_id.clone())
                .or_default()
                .push(extension.clone());
        }

        let handle = DescriptorHandle::new(descriptor);
        let registry_share = handle.share();
        let plugin_id = registry_share.id.clone();
        inner
            .plugins
            .insert(plugin_id, RegisteredPlugin::new(registry_share));

        Ok(handle)
    }

    pub fn uninstall(&self, plugin_id: &str) -> Result<(), Error> {
        uninstall::uninstall(self, plugin_id)
    }

    pub fn uninstall_all(&self) -> Result<(), Error> {
        uninstall::uninstall_all(self)
    }

    pub fn resolve(&self, plugin_id: &str) -> Result<(), Error> {
        resolver::resolve(self, plugin_id)
    }

    pub fn start(&self, plugin_id: &str) -> Result<(), Error> {
        activator::start(self, plugin_id)
    }

    pub fn stop(&self, plugin_id: &str) -> Result<(), Error> {
        activator::stop(self, plugin_id)
    }

    pub fn stop_all(&self) {
        activator::stop_all(self)
    }

    pub fn destroy(&self) -> Result<(), Error> {
        // Held for the whole call, including the delegated uninstall_all: the
        // mutex is re-entrant, so its internal ctx.lock() calls just add to
        // this thread's hold instead of releasing it between the check below
        // and the uninstallation pass.
        let guard = self.lock();
        let invocation_in_progress = {
            let inner = guard.inner.borrow();
            inner.start_invocations > 0 || inner.stop_invocations > 0
        };
        if invocation_in_progress {
            return Err(Error::InvalidInvocation(
                "cannot destroy a context from inside one of its plug-ins' start/stop callback"
                    .to_string(),
            ));
        }
        self.uninstall_all()
    }

    pub fn plugin_state(&self, plugin_id: &str) -> Result<PluginState, Error> {
        let guard = self.lock();
        guard
            .inner
            .borrow()
            .plugins
            .get(plugin_id)
            .map(|p| p.state)
            .ok_or_else(|| Error::Unknown(plugin_id.to_string()))
    }

    pub fn started_plugins(&self) -> Vec<String> {
        let guard = self.lock();
        guard.inner.borrow().started.clone()
    }

    pub fn get_info(&self, plugin_id: &str) -> Result<DescriptorHandle, Error> {
        let guard = self.lock();
        guard
            .inner
            .borrow()
            .plugins
            .get(plugin_id)
            .map(|p| p.descriptor.share())
            .ok_or_else(|| Error::Unknown(plugin_id.to_string()))
    }

    pub fn list_info(&self) -> Vec<DescriptorHandle> {
        let guard = self.lock();
        guard
            .inner
            .borrow()
            .plugins
            .values()
            .map(|p| p.descriptor.share())
            .collect()
    }

    pub fn extension_point(&self, global_id: &str) -> Option<ExtensionPoint> {
        let guard = self.lock();
        guard.inner.borrow().extension_points.get(global_id).cloned()
    }

    pub fn extensions_for(&self, point_global_id: &str) -> Vec<Extension> {
        let guard = self.lock();
        guard
            .inner
            .borrow()
            .extensions
            .get(point_global_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_event_listener(&self, callback: EventCallback) -> ListenerId {
        let guard = self.lock();
        let id = ListenerId::next();
        guard
            .listeners
            .borrow_mut()
            .push(EventListenerEntry { id, callback });
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) {
        let guard = self.lock();
        guard.listeners.borrow_mut().retain(|l| l.id != id);
    }

    pub fn add_logger(&self, callback: LogCallback, min_severity: Severity) -> ListenerId {
        let guard = self.lock();
        let id = ListenerId::next();
        guard.loggers.borrow_mut().push(LoggerEntry {
            id,
            callback,
            min_severity,
        });
        refresh_loggers_min(&guard);
        id
    }

    pub fn remove_logger(&self, id: ListenerId) {
        let guard = self.lock();
        guard.loggers.borrow_mut().retain(|l| l.id != id);
        refresh_loggers_min(&guard);
    }
}

fn refresh_loggers_min(guard: &Gate) {
    let min = guard.loggers.borrow().iter().map(|l| l.min_severity).min();
    guard.loggers_min.set(min);
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_descriptor::Descriptor;

    fn test_context() -> Arc<Context> {
        Context::create(
            Box::new(core_loader::TomlDescriptorParser::new()),
            Box::new(core_loader::MockSymbolLoader::new()),
        )
    }

    /// `Descriptor`'s fields are all `pub`, so a caller can bypass
    /// `DescriptorBuilder`'s identifier validation entirely; `install` must
    /// still reject the result.
    #[test]
    fn install_rejects_descriptor_with_overlong_identifier_built_outside_the_builder() {
        let ctx = test_context();
        let descriptor = Descriptor {
            id: "x".repeat(200),
            version: core_descriptor::Version::default(),
            provider_name: None,
            path: PathBuf::from("/plugins"),
            library: None,
            start_symbol: None,
            stop_symbol: None,
            imports: Vec::new(),
            extension_points: Vec::new(),
            extensions: Vec::new(),
        };

        let err = ctx.install(descriptor).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
        assert!(ctx.list_info().is_empty());
    }
}
