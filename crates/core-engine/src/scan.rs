//! Directory scanning and the install/upgrade/restart policy bit field.
//! `scan` walks every configured directory, parses each immediate
//! subdirectory as a candidate plug-in, and installs or upgrades it
//! according to `flags`.

use std::path::Path;

use bitflags::bitflags;

use crate::context::Context;
use crate::error::Error;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScanFlags: u32 {
        /// Replace an installed plug-in when an incoming one has a greater version.
        const UPGRADE = 0x01;
        /// Before performing any upgrade, stop every active plug-in.
        const STOP_ALL_ON_UPGRADE = 0x02;
        /// Before performing any install, stop every active plug-in.
        const STOP_ALL_ON_INSTALL = 0x04;
        /// After installs/upgrades, restart all plug-ins that were active before.
        const RESTART_ACTIVE = 0x08;
    }
}

/// Outcome of scanning one candidate directory.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Installed { plugin_id: String },
    Upgraded { plugin_id: String, from: core_descriptor::Version, to: core_descriptor::Version },
    Skipped { plugin_id: String },
    Failed { path: std::path::PathBuf, error: String },
}

/// Per-directory results of one `scan` call.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub outcomes: Vec<ScanOutcome>,
}

pub(crate) fn scan(ctx: &Context, flags: ScanFlags) -> ScanReport {
    let mut report = ScanReport::default();
    let candidates: Vec<std::path::PathBuf> = ctx
        .directories()
        .iter()
        .flat_map(|dir| list_subdirectories(dir))
        .collect();

    for candidate in candidates {
        match ctx.load_descriptor(&candidate) {
            Ok(descriptor) => report.outcomes.push(install_or_upgrade(ctx, descriptor, flags)),
            Err(error) => report.outcomes.push(ScanOutcome::Failed {
                path: candidate,
                error: error.to_string(),
            }),
        }
    }

    report
}

fn list_subdirectories(dir: &Path) -> Vec<std::path::PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect()
}

fn install_or_upgrade(
    ctx: &Context,
    descriptor: core_descriptor::Descriptor,
    flags: ScanFlags,
) -> ScanOutcome {
    let plugin_id = descriptor.id.clone();
    let existing_version = ctx.get_info(&plugin_id).ok().map(|handle| {
        let version = handle.version;
        handle.release();
        version
    });

    match existing_version {
        None => {
            if flags.contains(ScanFlags::STOP_ALL_ON_INSTALL) {
                ctx.stop_all();
            }
            match ctx.install(descriptor) {
                Ok(handle) => {
                    handle.release();
                    ScanOutcome::Installed { plugin_id }
                }
                Err(error) => ScanOutcome::Failed {
                    path: std::path::PathBuf::new(),
                    error: error.to_string(),
                },
            }
        }
        Some(installed_version) => {
            if !flags.contains(ScanFlags::UPGRADE) || descriptor.version <= installed_version {
                return ScanOutcome::Skipped { plugin_id };
            }

            let was_active = ctx
                .plugin_state(&plugin_id)
                .map(|state| state == crate::plugin_state::PluginState::Active)
                .unwrap_or(false);

            if flags.contains(ScanFlags::STOP_ALL_ON_UPGRADE) {
                ctx.stop_all();
            }

            if let Err(error) = ctx.uninstall(&plugin_id) {
                return ScanOutcome::Failed {
                    path: descriptor.path.clone(),
                    error: error.to_string(),
                };
            }

            let to = descriptor.version;
            match ctx.install(descriptor) {
                Ok(handle) => {
                    handle.release();
                    if flags.contains(ScanFlags::RESTART_ACTIVE) && was_active {
                        let _ = ctx.start(&plugin_id);
                    }
                    ScanOutcome::Upgraded {
                        plugin_id,
                        from: installed_version,
                        to,
                    }
                }
                Err(error) => ScanOutcome::Failed {
                    path: std::path::PathBuf::new(),
                    error: error.to_string(),
                },
            }
        }
    }
}

pub(crate) fn parse_error_to_engine_error(_dir: &Path, error: core_loader::ParseError) -> Error {
    match error {
        core_loader::ParseError::Io { path, source } => Error::Io { path, source },
        core_loader::ParseError::Malformed { path, reason } => Error::Malformed { path, reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_descriptor::DescriptorBuilder;
    use core_loader::{MockSymbolLoader, TomlDescriptorParser};
    use std::io::Write;

    fn test_context() -> std::sync::Arc<Context> {
        Context::create(
            Box::new(TomlDescriptorParser::new()),
            Box::new(MockSymbolLoader::new()),
        )
    }

    fn write_manifest(dir: &Path, id: &str, version: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut file = std::fs::File::create(dir.join("plugin.toml")).unwrap();
        writeln!(file, "id = \"{id}\"\nversion = \"{version}\"").unwrap();
    }

    #[test]
    fn scan_installs_new_plugins_found_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        write_manifest(&temp.path().join("alpha"), "alpha", "1.0");

        let ctx = test_context();
        ctx.add_directory(temp.path());
        let report = ctx.scan(ScanFlags::empty());

        assert!(matches!(
            report.outcomes.as_slice(),
            [ScanOutcome::Installed { plugin_id }] if plugin_id == "alpha"
        ));
        assert_eq!(
            ctx.plugin_state("alpha").unwrap(),
            crate::plugin_state::PluginState::Installed
        );
    }

    #[test]
    fn scan_skips_existing_plugin_without_upgrade_flag() {
        let temp = tempfile::tempdir().unwrap();
        write_manifest(&temp.path().join("alpha"), "alpha", "2.0");

        let ctx = test_context();
        ctx.install(
            DescriptorBuilder::new("alpha", "/plugins")
                .version("1.0".parse().unwrap())
                .build()
                .unwrap(),
        )
        .unwrap();
        ctx.add_directory(temp.path());

        let report = ctx.scan(ScanFlags::empty());
        assert!(matches!(
            report.outcomes.as_slice(),
            [ScanOutcome::Skipped { .. }]
        ));
    }

    #[test]
    fn scan_upgrades_to_newer_version_when_flagged() {
        let temp = tempfile::tempdir().unwrap();
        write_manifest(&temp.path().join("alpha"), "alpha", "2.0");

        let ctx = test_context();
        ctx.install(
            DescriptorBuilder::new("alpha", "/plugins")
                .version("1.0".parse().unwrap())
                .build()
                .unwrap(),
        )
        .unwrap();
        ctx.add_directory(temp.path());

        let report = ctx.scan(ScanFlags::UPGRADE);
        assert!(matches!(
            report.outcomes.as_slice(),
            [ScanOutcome::Upgraded { .. }]
        ));
        assert_eq!(ctx.get_info("alpha").unwrap().version, "2.0".parse().unwrap());
    }
}
