//! The plug-in lifecycle engine: per-context registry, two-phase dependency
//! resolution, dependency-ordered start/stop, uninstallation, directory
//! scanning, and the synchronous event/logging bus.

mod activator;
mod context;
mod error;
mod events;
mod plugin_state;
mod resolver;
mod scan;
mod uninstall;

pub use context::Context;
pub use error::{DependencyError, Error, ErrorKind, RuntimeError};
pub use events::{EventCallback, ListenerId, LogCallback, LogEntry, PluginEvent, Severity};
pub use plugin_state::PluginState;
pub use scan::{ScanFlags, ScanOutcome, ScanReport};
