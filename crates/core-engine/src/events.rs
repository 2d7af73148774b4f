use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::plugin_state::PluginState;

/// A state transition for a single plug-in, delivered to every registered
/// event listener in registration order, synchronously, while the
/// context's lock is held by the thread that caused the transition.
#[derive(Debug, Clone)]
pub struct PluginEvent {
    pub plugin_id: String,
    pub old_state: PluginState,
    pub new_state: PluginState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

pub type EventCallback = Arc<dyn Fn(&PluginEvent) + Send + Sync>;
pub type LogCallback = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Handle returned when registering an event listener or logger, used to
/// remove it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct EventListenerEntry {
    pub id: ListenerId,
    pub callback: EventCallback,
}

pub(crate) struct LoggerEntry {
    pub id: ListenerId,
    pub callback: LogCallback,
    pub min_severity: Severity,
}

/// Delivers every queued event to the context's listeners, in
/// registration order, one event at a time. Callers collect events into a
/// plain `Vec` while mutating plug-in state and call this once the mutating
/// pass is done, so dispatch never overlaps a live borrow of the registry.
pub(crate) fn dispatch_events(ctx: &crate::context::Context, events: Vec<PluginEvent>) {
    if events.is_empty() {
        return;
    }
    let guard = ctx.lock();
    let listeners = guard.listeners.borrow();
    for event in &events {
        tracing::debug!(
            target: "core_engine.lifecycle",
            plugin_id = %event.plugin_id,
            from = %event.old_state,
            to = %event.new_state,
            "plug-in state transition"
        );
        for entry in listeners.iter() {
            (entry.callback)(event);
        }
    }
}

/// Routes a message to host-registered loggers whose minimum severity
/// admits it, skipping the formatting closure entirely when no logger
/// would see the result.
pub(crate) fn log_to_hosts<F: FnOnce() -> String>(
    ctx: &crate::context::Context,
    severity: Severity,
    message: F,
) {
    let guard = ctx.lock();
    match guard.loggers_min.get() {
        Some(min) if severity >= min => {}
        _ => return,
    }
    let message = message();
    let loggers = guard.loggers.borrow();
    let entry = LogEntry { severity, message };
    for logger in loggers.iter() {
        if severity >= logger.min_severity {
            (logger.callback)(&entry);
        }
    }
}
