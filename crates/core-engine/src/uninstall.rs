//! Uninstallation: stop, unresolve dependents, deregister extensions,
//! drop the registry's own descriptor share.

use std::collections::HashSet;

use crate::activator;
use crate::context::Context;
use crate::error::Error;
use crate::events::PluginEvent;
use crate::plugin_state::PluginState;

pub(crate) fn uninstall(ctx: &Context, plugin_id: &str) -> Result<(), Error> {
    let _guard = ctx.lock();
    {
        let guard = ctx.lock();
        if !guard.inner.borrow().plugins.contains_key(plugin_id) {
            return Err(Error::Unknown(plugin_id.to_string()));
        }
    }

    activator::stop(ctx, plugin_id)?;

    let mut processed = HashSet::new();
    let mut pending = Vec::new();
    unresolve_recursive(ctx, plugin_id, &mut processed, &mut pending);
    finalize_uninstall(ctx, plugin_id, &mut pending);
    crate::events::dispatch_events(ctx, pending);
    Ok(())
}

pub(crate) fn uninstall_all(ctx: &Context) -> Result<(), Error> {
    let _guard = ctx.lock();
    activator::stop_all(ctx);
    loop {
        let next = {
            let guard = ctx.lock();
            guard.inner.borrow().plugins.keys().next().cloned()
        };
        match next {
            Some(id) => uninstall(ctx, &id)?,
            None => break,
        }
    }
    Ok(())
}

/// Moves every transitive dependent (and then `id` itself) back to
/// INSTALLED, clearing the RESOLVED-phase edges and runtime bindings, before
/// `id`'s own record is finally removed from the registry.
fn unresolve_recursive(
    ctx: &Context,
    id: &str,
    processed: &mut HashSet<String>,
    pending: &mut Vec<PluginEvent>,
) {
    if processed.contains(id) {
        return;
    }
    processed.insert(id.to_string());

    let importing: Vec<String> = {
        let guard = ctx.lock();
        guard
            .inner
            .borrow()
            .plugins
            .get(id)
            .map(|p| p.importing.iter().cloned().collect())
            .unwrap_or_default()
    };
    for dependent in importing {
        unresolve_recursive(ctx, &dependent, processed, pending);
    }

    let (old_state, imported, library) = {
        let guard = ctx.lock();
        let mut inner = guard.inner.borrow_mut();
        let Some(plugin) = inner.plugins.get_mut(id) else {
            return;
        };
        let old_state = plugin.state;
        if old_state == PluginState::Installed {
            return;
        }
        plugin.state = PluginState::Installed;
        plugin.start_fn = None;
        plugin.stop_fn = None;
        let imported: Vec<String> = plugin.imported.drain().collect();
        let library = plugin.library.take();
        (old_state, imported, library)
    };

    for target in &imported {
        let guard = ctx.lock();
        if let Some(p) = guard.inner.borrow_mut().plugins.get_mut(target) {
            p.importing.remove(id);
        }
    }
    if let Some(library) = library {
        ctx.symbol_loader.close(library);
    }

    pending.push(PluginEvent {
        plugin_id: id.to_string(),
        old_state,
        new_state: PluginState::Installed,
    });
}

/// Deregisters `id`'s extension points/extensions, drops the registry's own
/// descriptor share, and removes the plug-in's record entirely.
fn finalize_uninstall(ctx: &Context, id: &str, pending: &mut Vec<PluginEvent>) {
    let guard = ctx.lock();
    let mut inner = guard.inner.borrow_mut();

    inner
        .extension_points
        .retain(|_, point| point.owner_plugin_id != id);
    for extensions in inner.extensions.values_mut() {
        extensions.retain(|ext| ext.owner_plugin_id != id);
    }
    inner.extensions.retain(|_, v| !v.is_empty());

    if let Some(plugin) = inner.plugins.remove(id) {
        plugin.descriptor.release();
        pending.push(PluginEvent {
            plugin_id: id.to_string(),
            old_state: PluginState::Installed,
            new_state: PluginState::Uninstalled,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_descriptor::{ConfigElement, DescriptorBuilder, Import};
    use core_loader::{MockSymbolLoader, TomlDescriptorParser};

    fn test_context() -> std::sync::Arc<Context> {
        Context::create(
            Box::new(TomlDescriptorParser::new()),
            Box::new(MockSymbolLoader::new()),
        )
    }

    #[test]
    fn uninstall_unknown_plugin_fails() {
        let ctx = test_context();
        assert!(matches!(ctx.uninstall("missing"), Err(Error::Unknown(_))));
    }

    #[test]
    fn uninstall_deregisters_extension_points_and_releases_handle() {
        let ctx = test_context();
        let descriptor = DescriptorBuilder::new("a", "/plugins")
            .extension_point("slots", "Slots")
            .build()
            .unwrap();
        let host_handle = ctx.install(descriptor).unwrap();
        assert!(ctx.extension_point("a.slots").is_some());

        ctx.uninstall("a").unwrap();
        assert!(ctx.extension_point("a.slots").is_none());
        assert!(matches!(ctx.plugin_state("a"), Err(Error::Unknown(_))));
        assert!(!host_handle.is_released());
        host_handle.release();
    }

    #[test]
    fn uninstall_cyclic_pair_moves_both_back_to_installed() {
        let ctx = test_context();
        let a = DescriptorBuilder::new("a", "/plugins")
            .import(Import::new("b"))
            .build()
            .unwrap();
        let b = DescriptorBuilder::new("b", "/plugins")
            .import(Import::new("a"))
            .build()
            .unwrap();
        ctx.install(a).unwrap();
        ctx.install(b).unwrap();
        ctx.resolve("a").unwrap();

        ctx.uninstall("a").unwrap();
        assert!(matches!(ctx.plugin_state("a"), Err(Error::Unknown(_))));
        assert_eq!(ctx.plugin_state("b").unwrap(), PluginState::Installed);
    }

    #[test]
    fn uninstall_extensions_without_owned_point_are_dropped() {
        let ctx = test_context();
        let provider = DescriptorBuilder::new("provider", "/plugins")
            .extension_point("slots", "Slots")
            .build()
            .unwrap();
        ctx.install(provider).unwrap();
        let contributor = DescriptorBuilder::new("contributor", "/plugins")
            .extension("one", "provider.slots", "One", ConfigElement::root())
            .build()
            .unwrap();
        ctx.install(contributor).unwrap();
        assert_eq!(ctx.extensions_for("provider.slots").len(), 1);

        ctx.uninstall("contributor").unwrap();
        assert!(ctx.extensions_for("provider.slots").is_empty());
    }

    #[test]
    fn uninstall_all_empties_registry() {
        let ctx = test_context();
        ctx.install(DescriptorBuilder::new("a", "/plugins").build().unwrap())
            .unwrap();
        ctx.install(
            DescriptorBuilder::new("b", "/plugins")
                .import(Import::new("a"))
                .build()
                .unwrap(),
        )
        .unwrap();
        ctx.resolve("b").unwrap();
        ctx.start("b").unwrap();

        ctx.uninstall_all().unwrap();
        assert!(ctx.list_info().is_empty());
    }
}
