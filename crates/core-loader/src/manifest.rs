//! Reference [`DescriptorParser`] reading a `plugin.toml` manifest from a
//! plug-in's install directory. Grounded on `core-config`'s
//! serde-plus-toml loading style.

use std::path::Path;

use core_descriptor::{ConfigElement, Descriptor, DescriptorBuilder, Import, MatchRule, Version};
use serde::Deserialize;

use crate::{DescriptorParser, ParseError};

pub const MANIFEST_FILE_NAME: &str = "plugin.toml";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("invalid match rule {0:?}")]
    InvalidMatchRule(String),
    #[error(transparent)]
    Descriptor(#[from] core_descriptor::DescriptorError),
    #[error(transparent)]
    Version(#[from] core_descriptor::VersionParseError),
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    id: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    provider_name: Option<String>,
    #[serde(default)]
    library: Option<String>,
    #[serde(default)]
    start_symbol: Option<String>,
    #[serde(default)]
    stop_symbol: Option<String>,
    #[serde(default)]
    imports: Vec<ManifestImport>,
    #[serde(default)]
    extension_points: Vec<ManifestExtensionPoint>,
    #[serde(default)]
    extensions: Vec<ManifestExtension>,
}

#[derive(Debug, Deserialize)]
struct ManifestImport {
    id: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default, rename = "match")]
    match_rule: Option<String>,
    #[serde(default)]
    optional: bool,
}

#[derive(Debug, Deserialize)]
struct ManifestExtensionPoint {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ManifestExtension {
    #[serde(default)]
    id: String,
    point: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    configuration: Option<ManifestConfigElement>,
}

#[derive(Debug, Deserialize)]
struct ManifestConfigElement {
    #[serde(default = "default_root_name")]
    name: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    attributes: Vec<(String, String)>,
    #[serde(default)]
    children: Vec<ManifestConfigElement>,
}

fn default_root_name() -> String {
    "root".to_string()
}

impl From<ManifestConfigElement> for ConfigElement {
    fn from(m: ManifestConfigElement) -> Self {
        ConfigElement {
            name: m.name,
            attributes: m.attributes,
            text: m.text,
            children: m.children.into_iter().map(ConfigElement::from).collect(),
        }
    }
}

fn parse_match_rule(raw: Option<&str>) -> Result<MatchRule, ManifestError> {
    match raw {
        None => Ok(MatchRule::None),
        Some("none") => Ok(MatchRule::None),
        Some("perfect") => Ok(MatchRule::Perfect),
        Some("equivalent") => Ok(MatchRule::Equivalent),
        Some("compatible") => Ok(MatchRule::Compatible),
        Some("greater-or-equal") => Ok(MatchRule::GreaterOrEqual),
        Some(other) => Err(ManifestError::InvalidMatchRule(other.to_string())),
    }
}

fn build(manifest: ManifestFile, dir: &Path) -> Result<Descriptor, ManifestError> {
    let version: Version = match manifest.version {
        Some(v) => v.parse()?,
        None => Version::default(),
    };

    let mut builder = DescriptorBuilder::new(manifest.id, dir.to_path_buf()).version(version);
    if let Some(provider_name) = manifest.provider_name {
        builder = builder.provider_name(provider_name);
    }
    if let Some(library) = manifest.library {
        builder = builder.runtime(library);
    }
    if let Some(symbol) = manifest.start_symbol {
        builder = builder.start_symbol(symbol);
    }
    if let Some(symbol) = manifest.stop_symbol {
        builder = builder.stop_symbol(symbol);
    }

    for import in manifest.imports {
        let match_rule = parse_match_rule(import.match_rule.as_deref())?;
        let version = import.version.as_deref().map(str::parse).transpose()?;
        builder = builder.import(Import {
            plugin_id: import.id,
            version,
            match_rule,
            optional: import.optional,
        });
    }

    for point in manifest.extension_points {
        builder = builder.extension_point(point.id, point.name);
    }

    for extension in manifest.extensions {
        let configuration = extension
            .configuration
            .map(ConfigElement::from)
            .unwrap_or_else(ConfigElement::root);
        builder = builder.extension(extension.id, extension.point, extension.name, configuration);
    }

    Ok(builder.build()?)
}

/// Reads `<dir>/plugin.toml` and builds a [`Descriptor`] from it.
#[derive(Default)]
pub struct TomlDescriptorParser;

impl TomlDescriptorParser {
    pub fn new() -> Self {
        Self
    }
}

impl DescriptorParser for TomlDescriptorParser {
    fn parse(&self, dir: &Path) -> Result<Descriptor, ParseError> {
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        let contents = std::fs::read_to_string(&manifest_path).map_err(|source| ParseError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        let manifest: ManifestFile = toml::from_str(&contents).map_err(|e| ParseError::Malformed {
            path: manifest_path.clone(),
            reason: e.to_string(),
        })?;
        build(manifest, dir).map_err(|e| ParseError::Malformed {
            path: manifest_path,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &Path, contents: &str) {
        let mut file = std::fs::File::create(dir.join(MANIFEST_FILE_NAME)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn parses_minimal_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "id = \"com.example.alpha\"\nversion = \"1.2.3.4\"\n");
        let descriptor = TomlDescriptorParser::new().parse(dir.path()).unwrap();
        assert_eq!(descriptor.id, "com.example.alpha");
        assert_eq!(descriptor.version, Version::new(1, 2, 3, 4));
    }

    #[test]
    fn parses_imports_extension_points_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"
id = "com.example.alpha"
version = "1.0"
library = "libalpha.so"
start_symbol = "alpha_start"
stop_symbol = "alpha_stop"

[[imports]]
id = "com.example.beta"
version = "1.0"
match = "compatible"
optional = false

[[extension_points]]
id = "points"
name = "Alpha Points"

[[extensions]]
id = "ext1"
point = "com.example.beta.slots"
name = "My Extension"
[extensions.configuration]
name = "root"
"#,
        );
        let descriptor = TomlDescriptorParser::new().parse(dir.path()).unwrap();
        assert_eq!(descriptor.imports.len(), 1);
        assert_eq!(descriptor.imports[0].match_rule, MatchRule::Compatible);
        assert_eq!(descriptor.extension_points[0].global_id, "com.example.alpha.points");
        assert_eq!(descriptor.extensions[0].global_id, "com.example.alpha.ext1");
        assert_eq!(descriptor.library.as_deref(), Some("libalpha.so"));
    }

    #[test]
    fn missing_manifest_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TomlDescriptorParser::new().parse(dir.path()).unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }

    #[test]
    fn invalid_match_rule_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "id = \"com.example.alpha\"\n[[imports]]\nid = \"x\"\nmatch = \"bogus\"\n",
        );
        let err = TomlDescriptorParser::new().parse(dir.path()).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }
}
