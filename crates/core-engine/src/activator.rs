//! Dependency-ordered start, dependent-ordered stop: starting a plug-in
//! first starts everything it imports, stopping one first stops everything
//! that imports it.

use std::collections::HashSet;

use crate::context::Context;
use crate::error::{Error, RuntimeError};
use crate::events::{dispatch_events, log_to_hosts, PluginEvent, Severity};
use crate::plugin_state::PluginState;
use crate::resolver;

pub(crate) fn start(ctx: &Context, plugin_id: &str) -> Result<(), Error> {
    // Held for the whole call, including the plug-in's own start/stop
    // callback: the mutex is re-entrant, so every nested ctx.lock() below
    // just adds to this thread's hold instead of releasing it to others.
    let _guard = ctx.lock();
    {
        let guard = ctx.lock();
        let inner = guard.inner.borrow();
        let plugin = inner
            .plugins
            .get(plugin_id)
            .ok_or_else(|| Error::Unknown(plugin_id.to_string()))?;
        if plugin.state.is_at_least(PluginState::Active) {
            return Ok(());
        }
    }

    resolver::resolve(ctx, plugin_id)?;

    let mut processed = HashSet::new();
    let mut pending = Vec::new();
    let result = start_recursive(ctx, plugin_id, &mut processed, &mut pending);
    dispatch_events(ctx, pending);
    result
}

fn start_recursive(
    ctx: &Context,
    id: &str,
    processed: &mut HashSet<String>,
    pending: &mut Vec<PluginEvent>,
) -> Result<(), Error> {
    if processed.contains(id) {
        return Ok(());
    }
    processed.insert(id.to_string());

    let already_active = {
        let guard = ctx.lock();
        guard
            .inner
            .borrow()
            .plugins
            .get(id)
            .map(|p| p.state.is_at_least(PluginState::Active))
            .unwrap_or(false)
    };
    if already_active {
        return Ok(());
    }

    let imported: Vec<String> = {
        let guard = ctx.lock();
        guard
            .inner
            .borrow()
            .plugins
            .get(id)
            .map(|p| p.imported.iter().cloned().collect())
            .unwrap_or_default()
    };
    for dependency in imported {
        start_recursive(ctx, &dependency, processed, pending)?;
    }

    let old_state = set_state(ctx, id, PluginState::Starting);
    pending.push(PluginEvent {
        plugin_id: id.to_string(),
        old_state,
        new_state: PluginState::Starting,
    });

    let start_fn = {
        let guard = ctx.lock();
        guard.inner.borrow().plugins.get(id).unwrap().start_fn.clone()
    };

    let success = match start_fn {
        None => true,
        Some(f) => {
            increment(ctx, Counter::Start);
            let code = f();
            decrement(ctx, Counter::Start);
            code == 0
        }
    };

    if success {
        {
            let guard = ctx.lock();
            let mut inner = guard.inner.borrow_mut();
            inner.started.push(id.to_string());
            inner.plugins.get_mut(id).unwrap().state = PluginState::Active;
        }
        pending.push(PluginEvent {
            plugin_id: id.to_string(),
            old_state: PluginState::Starting,
            new_state: PluginState::Active,
        });
        Ok(())
    } else {
        log_to_hosts(ctx, Severity::Error, || {
            format!("plug-in {id:?} start function failed")
        });
        pending.push(PluginEvent {
            plugin_id: id.to_string(),
            old_state: PluginState::Starting,
            new_state: PluginState::Stopping,
        });
        let stop_fn = {
            let guard = ctx.lock();
            guard.inner.borrow().plugins.get(id).and_then(|p| p.stop_fn.clone())
        };
        if let Some(f) = stop_fn {
            increment(ctx, Counter::Stop);
            f();
            decrement(ctx, Counter::Stop);
        }
        set_state(ctx, id, PluginState::Resolved);
        pending.push(PluginEvent {
            plugin_id: id.to_string(),
            old_state: PluginState::Stopping,
            new_state: PluginState::Resolved,
        });
        Err(RuntimeError::StartFailed {
            plugin_id: id.to_string(),
        }
        .into())
    }
}

pub(crate) fn stop(ctx: &Context, plugin_id: &str) -> Result<(), Error> {
    let _guard = ctx.lock();
    {
        let guard = ctx.lock();
        let inner = guard.inner.borrow();
        let plugin = inner
            .plugins
            .get(plugin_id)
            .ok_or_else(|| Error::Unknown(plugin_id.to_string()))?;
        if !plugin.state.is_at_least(PluginState::Active) {
            return Ok(());
        }
    }

    let mut processed = HashSet::new();
    let mut pending = Vec::new();
    stop_recursive(ctx, plugin_id, &mut processed, &mut pending);
    dispatch_events(ctx, pending);
    Ok(())
}

fn stop_recursive(
    ctx: &Context,
    id: &str,
    processed: &mut HashSet<String>,
    pending: &mut Vec<PluginEvent>,
) {
    if processed.contains(id) {
        return;
    }
    processed.insert(id.to_string());

    let active = {
        let guard = ctx.lock();
        guard
            .inner
            .borrow()
            .plugins
            .get(id)
            .map(|p| p.state.is_at_least(PluginState::Active))
            .unwrap_or(false)
    };
    if !active {
        return;
    }

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
        stop_recursive(ctx, &dependent, processed, pending);
    }

    let old_state = set_state(ctx, id, PluginState::Stopping);
    pending.push(PluginEvent {
        plugin_id: id.to_string(),
        old_state,
        new_state: PluginState::Stopping,
    });

    let stop_fn = {
        let guard = ctx.lock();
        guard.inner.borrow().plugins.get(id).and_then(|p| p.stop_fn.clone())
    };
    if let Some(f) = stop_fn {
        increment(ctx, Counter::Stop);
        f();
        decrement(ctx, Counter::Stop);
    }

    {
        let guard = ctx.lock();
        let mut inner = guard.inner.borrow_mut();
        inner.started.retain(|p| p != id);
        inner.plugins.get_mut(id).unwrap().state = PluginState::Resolved;
    }
    pending.push(PluginEvent {
        plugin_id: id.to_string(),
        old_state: PluginState::Stopping,
        new_state: PluginState::Resolved,
    });
}

pub(crate) fn stop_all(ctx: &Context) {
    let _guard = ctx.lock();
    loop {
        let last = {
            let guard = ctx.lock();
            guard.inner.borrow().started.last().cloned()
        };
        match last {
            Some(id) => {
                let _ = stop(ctx, &id);
            }
            None => break,
        }
    }
}

fn set_state(ctx: &Context, id: &str, new_state: PluginState) -> PluginState {
    let guard = ctx.lock();
    let mut inner = guard.inner.borrow_mut();
    let plugin = inner.plugins.get_mut(id).unwrap();
    let old = plugin.state;
    plugin.state = new_state;
    old
}

enum Counter {
    Start,
    Stop,
}

fn increment(ctx: &Context, counter: Counter) {
    let guard = ctx.lock();
    let mut inner = guard.inner.borrow_mut();
    match counter {
        Counter::Start => inner.start_invocations += 1,
        Counter::Stop => inner.stop_invocations += 1,
    }
}

fn decrement(ctx: &Context, counter: Counter) {
    let guard = ctx.lock();
    let mut inner = guard.inner.borrow_mut();
    match counter {
        Counter::Start => inner.start_invocations -= 1,
        Counter::Stop => inner.stop_invocations -= 1,
    }
}
