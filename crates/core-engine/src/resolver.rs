//! Two-phase (preliminary pass, then commit) recursive dependency
//! resolution, tolerant of cyclic imports.

use std::collections::HashSet;

use core_descriptor::Import;

use crate::context::Context;
use crate::error::{DependencyError, Error, RuntimeError};
use crate::events::PluginEvent;
use crate::plugin_state::PluginState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    Preliminary,
}

pub(crate) fn resolve(ctx: &Context, plugin_id: &str) -> Result<(), Error> {
    // Held for the whole call; nested ctx.lock() calls in the helpers below
    // re-enter the same thread's hold rather than releasing it to others.
    let _guard = ctx.lock();
    {
        let guard = ctx.lock();
        let inner = guard.inner.borrow();
        let plugin = inner
            .plugins
            .get(plugin_id)
            .ok_or_else(|| Error::Unknown(plugin_id.to_string()))?;
        if plugin.state.is_at_least(PluginState::Resolved) {
            return Ok(());
        }
    }

    let mut processed = HashSet::new();
    let mut pending = Vec::new();

    match resolve_recursive(ctx, plugin_id, &mut processed, &mut pending) {
        Ok(_) => {
            commit(ctx, &processed, &mut pending);
            crate::events::dispatch_events(ctx, pending);
            Ok(())
        }
        Err(err) => {
            rollback(ctx, &processed);
            Err(err)
        }
    }
}

fn resolve_recursive(
    ctx: &Context,
    id: &str,
    processed: &mut HashSet<String>,
    pending: &mut Vec<PluginEvent>,
) -> Result<Outcome, Error> {
    if processed.contains(id) {
        // An ancestor on the current call stack is still being resolved:
        // this is the cyclic-import case, not a failure.
        return Ok(Outcome::Preliminary);
    }
    processed.insert(id.to_string());

    let imports: Vec<Import> = {
        let guard = ctx.lock();
        let inner = guard.inner.borrow();
        inner
            .plugins
            .get(id)
            .expect("id was just confirmed present")
            .descriptor
            .imports
            .clone()
    };

    let mut any_preliminary = false;
    for import in &imports {
        let target_version = {
            let guard = ctx.lock();
            let inner = guard.inner.borrow();
            inner
                .plugins
                .get(&import.plugin_id)
                .map(|p| p.descriptor.version)
        };

        let version = match target_version {
            None => {
                if import.optional {
                    continue;
                }
                return Err(DependencyError::Missing {
                    importer: id.to_string(),
                    target: import.plugin_id.clone(),
                }
                .into());
            }
            Some(version) => version,
        };

        if !import.is_satisfied_by(version) {
            if import.optional {
                continue;
            }
            return Err(DependencyError::VersionMismatch {
                importer: id.to_string(),
                target: import.plugin_id.clone(),
                actual: version,
            }
            .into());
        }

        {
            let guard = ctx.lock();
            let mut inner = guard.inner.borrow_mut();
            inner
                .plugins
                .get_mut(id)
                .unwrap()
                .imported
                .insert(import.plugin_id.clone());
            inner
                .plugins
                .get_mut(&import.plugin_id)
                .unwrap()
                .importing
                .insert(id.to_string());
        }

        if resolve_recursive(ctx, &import.plugin_id, processed, pending)? == Outcome::Preliminary {
            any_preliminary = true;
        }
    }

    bind_runtime(ctx, id)?;

    if any_preliminary {
        return Ok(Outcome::Preliminary);
    }

    let old_state = {
        let guard = ctx.lock();
        let mut inner = guard.inner.borrow_mut();
        let plugin = inner.plugins.get_mut(id).unwrap();
        let old_state = plugin.state;
        plugin.state = PluginState::Resolved;
        old_state
    };
    pending.push(PluginEvent {
        plugin_id: id.to_string(),
        old_state,
        new_state: PluginState::Resolved,
    });
    Ok(Outcome::Ok)
}

fn bind_runtime(ctx: &Context, id: &str) -> Result<(), Error> {
    let (library, start_symbol, stop_symbol, path) = {
        let guard = ctx.lock();
        let inner = guard.inner.borrow();
        let descriptor = &inner.plugins.get(id).unwrap().descriptor;
        (
            descriptor.library.clone(),
            descriptor.start_symbol.clone(),
            descriptor.stop_symbol.clone(),
            descriptor.path.clone(),
        )
    };

    let Some(library) = library else {
        return Ok(());
    };

    let lib_path = path.join(&library);
    let handle = ctx
        .symbol_loader
        .open(&lib_path)
        .map_err(|source| RuntimeError::Binding {
            plugin_id: id.to_string(),
            source,
        })?;

    let start_fn = match &start_symbol {
        Some(symbol) => Some(ctx.symbol_loader.resolve(&handle, symbol).map_err(|source| {
            RuntimeError::Binding {
                plugin_id: id.to_string(),
                source,
            }
        })?),
        None => None,
    };
    let stop_fn = match &stop_symbol {
        Some(symbol) => Some(ctx.symbol_loader.resolve(&handle, symbol).map_err(|source| {
            RuntimeError::Binding {
                plugin_id: id.to_string(),
                source,
            }
        })?),
        None => None,
    };

    let guard = ctx.lock();
    let mut inner = guard.inner.borrow_mut();
    let plugin = inner.plugins.get_mut(id).unwrap();
    plugin.library = Some(handle);
    plugin.start_fn = start_fn;
    plugin.stop_fn = stop_fn;
    Ok(())
}

/// Phase 2: walk the processed set once, resolving every plug-in still
/// left at INSTALLED (the cyclic peers that `resolve_recursive` deferred).
fn commit(ctx: &Context, processed: &HashSet<String>, pending: &mut Vec<PluginEvent>) {
    for id in processed {
        let guard = ctx.lock();
        let mut inner = guard.inner.borrow_mut();
        let Some(plugin) = inner.plugins.get_mut(id) else {
            continue;
        };
        if plugin.state == PluginState::Installed {
            plugin.state = PluginState::Resolved;
            drop(inner);
            pending.push(PluginEvent {
                plugin_id: id.clone(),
                old_state: PluginState::Installed,
                new_state: PluginState::Resolved,
            });
        }
    }
}

/// Failure path: undo edges recorded during the failing traversal and
/// close any runtime libraries opened along the way, leaving every
/// processed plug-in at INSTALLED.
fn rollback(ctx: &Context, processed: &HashSet<String>) {
    for id in processed {
        let (imported, library) = {
            let guard = ctx.lock();
            let mut inner = guard.inner.borrow_mut();
            let Some(plugin) = inner.plugins.get_mut(id) else {
                continue;
            };
            let imported: Vec<String> = plugin.imported.drain().collect();
            plugin.start_fn = None;
            plugin.stop_fn = None;
            let library = plugin.library.take();
            (imported, library)
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
    }
}
