use std::collections::HashSet;

use core_descriptor::DescriptorHandle;
use core_loader::BoundSymbol;

/// A plug-in's position in the per-context lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    /// Transient, terminal: emitted once on the way out of the registry;
    /// never observed via a state query since the record is removed
    /// immediately after this event is delivered.
    Uninstalled,
}

impl PluginState {
    pub fn is_at_least(self, other: PluginState) -> bool {
        self.rank() >= other.rank()
    }

    fn rank(self) -> u8 {
        match self {
            PluginState::Installed => 0,
            PluginState::Resolved => 1,
            PluginState::Starting => 2,
            PluginState::Active => 3,
            PluginState::Stopping => 2,
            PluginState::Uninstalled => 0,
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PluginState::Installed => "INSTALLED",
            PluginState::Resolved => "RESOLVED",
            PluginState::Starting => "STARTING",
            PluginState::Active => "ACTIVE",
            PluginState::Stopping => "STOPPING",
            PluginState::Uninstalled => "UNINSTALLED",
        };
        f.write_str(s)
    }
}

/// Mutable per-context state for one installed plug-in. The
/// "processed" flag used to break resolution recursion is deliberately
/// not a field here — it lives as an auxiliary, per-call
/// `HashSet` in the resolver so that it can never leak stale state between
/// unrelated operations.
pub struct RegisteredPlugin {
    pub descriptor: DescriptorHandle,
    pub state: PluginState,
    pub imported: HashSet<String>,
    pub importing: HashSet<String>,
    pub library: Option<core_loader::LibraryHandle>,
    pub start_fn: Option<BoundSymbol>,
    pub stop_fn: Option<BoundSymbol>,
}

impl RegisteredPlugin {
    pub fn new(descriptor: DescriptorHandle) -> Self {
        Self {
            descriptor,
            state: PluginState::Installed,
            imported: HashSet::new(),
            importing: HashSet::new(),
            library: None,
            start_fn: None,
            stop_fn: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}
