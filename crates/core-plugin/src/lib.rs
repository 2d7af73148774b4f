//! The framework facade: process-wide init/destroy reference counting,
//! fatal-error handler installation, implementation-info query, and
//! `framework.toml` configuration loading. Per-context state lives in
//! `core-engine`; this crate is the thin, global layer a host touches once
//! at startup and once at shutdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Once, OnceLock, Weak};

use core_engine::{Context, ListenerId, LogCallback, Severity};
use parking_lot::Mutex as PlMutex;
use serde::Deserialize;

static INIT_COUNT: AtomicUsize = AtomicUsize::new(0);

fn contexts() -> &'static PlMutex<Vec<Weak<Context>>> {
    static CONTEXTS: OnceLock<PlMutex<Vec<Weak<Context>>>> = OnceLock::new();
    CONTEXTS.get_or_init(|| PlMutex::new(Vec::new()))
}

fn fatal_handler() -> &'static PlMutex<Option<FatalErrorHandler>> {
    static HANDLER: OnceLock<PlMutex<Option<FatalErrorHandler>>> = OnceLock::new();
    HANDLER.get_or_init(|| PlMutex::new(None))
}

fn global_loggers() -> &'static PlMutex<Vec<GlobalLoggerEntry>> {
    static LOGGERS: OnceLock<PlMutex<Vec<GlobalLoggerEntry>>> = OnceLock::new();
    LOGGERS.get_or_init(|| PlMutex::new(Vec::new()))
}

static NEXT_FRAMEWORK_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`add_logger`], used to remove it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameworkListenerId(u64);

struct GlobalLoggerEntry {
    id: FrameworkListenerId,
    callback: LogCallback,
    min_severity: Severity,
    context_filter: Option<Weak<Context>>,
    /// Per-context registrations made so far, so `remove_logger` can undo
    /// each one via `Context::remove_logger`.
    registrations: Vec<(Weak<Context>, ListenerId)>,
}

fn context_matches(filter: &Option<Weak<Context>>, ctx: &Arc<Context>) -> bool {
    match filter {
        None => true,
        Some(weak) => weak.upgrade().is_some_and(|target| Arc::ptr_eq(&target, ctx)),
    }
}

/// Registers a logger across every context the framework knows about via
/// [`track_context`], or a single one when `context` is given. Unlike
/// `Context::add_logger`, this can be called before any context exists —
/// the logger is attached retroactively to contexts tracked afterward.
pub fn add_logger(
    callback: LogCallback,
    min_severity: Severity,
    context: Option<&Arc<Context>>,
) -> FrameworkListenerId {
    let id = FrameworkListenerId(NEXT_FRAMEWORK_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
    let context_filter = context.map(Arc::downgrade);

    let tracked: Vec<Weak<Context>> = contexts().lock().clone();
    let mut registrations = Vec::new();
    for weak in &tracked {
        if let Some(ctx) = weak.upgrade() {
            if context_matches(&context_filter, &ctx) {
                let per_context_id = ctx.add_logger(callback.clone(), min_severity);
                registrations.push((Arc::downgrade(&ctx), per_context_id));
            }
        }
    }

    global_loggers().lock().push(GlobalLoggerEntry {
        id,
        callback,
        min_severity,
        context_filter,
        registrations,
    });
    id
}

/// Undoes a prior [`add_logger`], removing the logger from every context it
/// was attached to.
pub fn remove_logger(id: FrameworkListenerId) {
    let mut loggers = global_loggers().lock();
    let Some(pos) = loggers.iter().position(|entry| entry.id == id) else {
        return;
    };
    let entry = loggers.remove(pos);
    for (weak, per_context_id) in entry.registrations {
        if let Some(ctx) = weak.upgrade() {
            ctx.remove_logger(per_context_id);
        }
    }
}

/// Invoked for conditions the core deems unrecoverable. The process aborts
/// once the handler returns.
pub type FatalErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Release, API compatibility, and platform metadata a host can query
/// without creating a context.
#[derive(Debug, Clone)]
pub struct ImplementationInfo {
    pub release_version: &'static str,
    pub api_version: u32,
    pub api_revision: u32,
    pub api_age: u32,
    pub host_triple: String,
    pub threading_model: &'static str,
}

pub fn implementation_info() -> ImplementationInfo {
    ImplementationInfo {
        release_version: env!("CARGO_PKG_VERSION"),
        api_version: 1,
        api_revision: 0,
        api_age: 0,
        host_triple: format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
        threading_model: "re-entrant-per-context-lock",
    }
}

/// Bumps the process-wide init count and installs the fatal-error panic
/// bridge once, regardless of how many times `init` is called. Idempotent:
/// the Nth `init` simply increments the counter.
pub fn init() -> ImplementationInfo {
    install_panic_bridge();
    INIT_COUNT.fetch_add(1, Ordering::SeqCst);
    implementation_info()
}

fn install_panic_bridge() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "core_plugin.panic", ?info, "panic in framework-hosted code");
            default_panic(info);
        }));
    });
}

/// Decrements the process-wide init count. On the Nth call (count reaching
/// zero), every context created since the matching `init` is uninstalled
/// via its own `uninstall_all`, draining plug-ins before the context itself
/// is dropped. Contexts a host still holds `Arc`s to after this point are
/// empty but not deallocated, matching the host's own reference lifetime.
pub fn destroy() {
    let previous = INIT_COUNT.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
        count.checked_sub(1)
    });
    let Ok(0) = previous.map(|count| count.saturating_sub(1)) else {
        return;
    };

    let mut registry = contexts().lock();
    for weak in registry.drain(..) {
        if let Some(ctx) = weak.upgrade() {
            if let Err(error) = ctx.uninstall_all() {
                tracing::warn!(
                    target: "core_plugin.lifecycle",
                    %error,
                    "context uninstall during framework destroy reported an error"
                );
            }
        }
    }
}

/// Registers `ctx` so that `destroy()` reaches it. Call this once per
/// context a host creates through this crate; contexts created directly
/// through `core_engine::Context::create` without registering here are the
/// host's sole responsibility to tear down.
pub fn track_context(ctx: &Arc<Context>) {
    contexts().lock().push(Arc::downgrade(ctx));

    let mut loggers = global_loggers().lock();
    for entry in loggers.iter_mut() {
        if context_matches(&entry.context_filter, ctx) {
            let per_context_id = ctx.add_logger(entry.callback.clone(), entry.min_severity);
            entry.registrations.push((Arc::downgrade(ctx), per_context_id));
        }
    }
}

/// Installs (or replaces) the process-wide fatal-error handler.
pub fn set_fatal_error_handler(handler: FatalErrorHandler) {
    *fatal_handler().lock() = Some(handler);
}

/// Reports an unrecoverable internal condition: invokes the installed
/// handler, if any, then aborts the process. Never returns.
pub fn report_fatal(message: &str) -> ! {
    tracing::error!(target: "core_plugin.fatal", message, "fatal framework error");
    if let Some(handler) = fatal_handler().lock().clone() {
        handler(message);
    }
    std::process::abort();
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct FrameworkConfigFile {
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub log_level: Option<String>,
}

pub const FRAMEWORK_CONFIG_FILE_NAME: &str = "framework.toml";

/// Best-effort config path: a local `framework.toml` first, then the
/// platform config directory.
pub fn discover_config() -> PathBuf {
    let local = PathBuf::from(FRAMEWORK_CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("core-plugin").join(FRAMEWORK_CONFIG_FILE_NAME);
    }
    PathBuf::from(FRAMEWORK_CONFIG_FILE_NAME)
}

/// Loads `framework.toml` from `path`, or the discovered location when
/// `path` is `None`. A missing or unparsable file yields defaults rather
/// than an error — configuration is advisory, not load-bearing.
pub fn load_config(path: Option<PathBuf>) -> FrameworkConfigFile {
    let path = path.unwrap_or_else(discover_config);
    match std::fs::read_to_string(&path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => FrameworkConfigFile::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // All three sections below touch the process-wide INIT_COUNT and/or the
    // weak context registry `add_logger`/`track_context`/`destroy` share;
    // run as one test so cargo's parallel test runner can't interleave them
    // (e.g. one section's `destroy()` draining a context another section is
    // still using).
    #[test]
    fn init_destroy_context_teardown_and_framework_logger() {
        init();
        init();
        assert_eq!(INIT_COUNT.load(Ordering::SeqCst), 2);
        destroy();
        assert_eq!(INIT_COUNT.load(Ordering::SeqCst), 1);

        let ctx = Context::create(
            Box::new(core_loader::TomlDescriptorParser::new()),
            Box::new(core_loader::MockSymbolLoader::new()),
        );
        ctx.install(
            core_descriptor::DescriptorBuilder::new("a", "/plugins")
                .build()
                .unwrap(),
        )
        .unwrap();
        track_context(&ctx);

        destroy();
        assert_eq!(INIT_COUNT.load(Ordering::SeqCst), 0);
        assert!(ctx.list_info().is_empty());

        // Framework-wide logger: registers across every tracked context,
        // picks up contexts tracked afterward, and respects an optional
        // context filter. `destroy()` above already drained the registry,
        // so `ctx_a`/`ctx_b` below start from an empty one.
        let loader_a = core_loader::MockSymbolLoader::new();
        loader_a.register("/plugins/lib.so", "start", || 1);
        let ctx_a = Context::create(
            Box::new(core_loader::TomlDescriptorParser::new()),
            Box::new(loader_a),
        );
        ctx_a
            .install(
                core_descriptor::DescriptorBuilder::new("a", "/plugins")
                    .runtime("lib.so")
                    .start_symbol("start")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let loader_b = core_loader::MockSymbolLoader::new();
        loader_b.register("/plugins/lib.so", "start", || 1);
        let ctx_b = Context::create(
            Box::new(core_loader::TomlDescriptorParser::new()),
            Box::new(loader_b),
        );
        ctx_b
            .install(
                core_descriptor::DescriptorBuilder::new("b", "/plugins")
                    .runtime("lib.so")
                    .start_symbol("start")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        track_context(&ctx_a);

        let seen = Arc::new(PlMutex::new(Vec::new()));
        let recorder = seen.clone();
        let global_id = add_logger(
            Arc::new(move |entry: &core_engine::LogEntry| {
                recorder.lock().push(entry.message.clone());
            }),
            Severity::Error,
            None,
        );

        // Tracked after the logger was registered; still picks it up.
        track_context(&ctx_b);

        let filtered_seen = Arc::new(PlMutex::new(Vec::new()));
        let filtered_recorder = filtered_seen.clone();
        add_logger(
            Arc::new(move |entry: &core_engine::LogEntry| {
                filtered_recorder.lock().push(entry.message.clone());
            }),
            Severity::Error,
            Some(&ctx_a),
        );

        ctx_a.start("a").unwrap_err();
        ctx_b.start("b").unwrap_err();

        assert_eq!(seen.lock().len(), 2, "global logger sees both contexts");
        assert_eq!(
            filtered_seen.lock().len(),
            1,
            "filtered logger sees only its own context"
        );

        remove_logger(global_id);
        seen.lock().clear();
        ctx_a.start("a").unwrap_err();
        assert!(seen.lock().is_empty(), "removed logger stops receiving events");
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = load_config(Some(PathBuf::from("__nonexistent_framework_toml__")));
        assert!(config.directories.is_empty());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn parses_directories_and_log_level() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            temp.path(),
            "directories = [\"/opt/plugins\"]\nlog_level = \"debug\"\n",
        )
        .unwrap();
        let config = load_config(Some(temp.path().to_path_buf()));
        assert_eq!(config.directories, vec![PathBuf::from("/opt/plugins")]);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }
}
