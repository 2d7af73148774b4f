//! A small host binary wiring the framework facade end to end: scan a
//! directory of `plugin.toml` manifests, install what it finds, resolve,
//! start, print every lifecycle event to stdout, then stop on exit.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use core_engine::{Context, PluginEvent, ScanFlags, Severity};
use core_loader::{NativeSymbolLoader, TomlDescriptorParser};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "plugin-host-demo", version, about = "Plug-in lifecycle framework demo host")]
struct Args {
    /// Directory to scan for plug-in subdirectories, each containing a plugin.toml.
    #[arg(long = "dir")]
    directory: PathBuf,

    /// Plug-in identifier to start after a successful scan, if any.
    #[arg(long = "start")]
    start: Option<String>,

    /// Write internal diagnostics to plugin-host-demo.log instead of stderr.
    #[arg(long = "log-to-file")]
    log_to_file: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging(args.log_to_file);

    let impl_info = core_plugin::init();
    info!(
        target: "plugin_host_demo.startup",
        release_version = impl_info.release_version,
        host_triple = %impl_info.host_triple,
        "framework initialized"
    );

    let ctx = Context::create(
        Box::new(TomlDescriptorParser::new()),
        Box::new(NativeSymbolLoader::new()),
    );
    core_plugin::track_context(&ctx);

    ctx.add_event_listener(std::sync::Arc::new(|event: &PluginEvent| {
        println!("{} : {} -> {}", event.plugin_id, event.old_state, event.new_state);
    }));
    ctx.add_logger(
        std::sync::Arc::new(|entry| println!("[{:?}] {}", entry.severity, entry.message)),
        Severity::Info,
    );

    ctx.add_directory(&args.directory);
    let report = ctx.scan(ScanFlags::UPGRADE | ScanFlags::RESTART_ACTIVE);
    for outcome in &report.outcomes {
        info!(target: "plugin_host_demo.scan", ?outcome, "scan outcome");
    }

    if let Some(plugin_id) = args.start.as_deref() {
        ctx.start(plugin_id)?;
    }

    ctx.stop_all();
    ctx.uninstall_all()?;
    core_plugin::destroy();
    Ok(())
}

/// Initializes the tracing subscriber, optionally routing output through a
/// non-blocking file appender instead of stderr. The returned guard must be
/// held for the process lifetime or buffered lines are lost on exit.
fn configure_logging(log_to_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if !log_to_file {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::never(".", "plugin-host-demo.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();
    Some(guard)
}
