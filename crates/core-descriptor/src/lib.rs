//! Value types shared by every other crate in the plug-in framework:
//! versions, descriptors, extension points/extensions, and the
//! reference-counted descriptor handle a host uses to pin a descriptor in
//! memory independently of the registry's own lifecycle.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

mod config_element;
mod identifier;
mod version;

pub use config_element::ConfigElement;
pub use identifier::{validate_identifier, IdentifierError};
pub use version::{MatchRule, Version, VersionParseError};

/// An import declared by a plug-in against another plug-in's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub plugin_id: String,
    pub version: Option<Version>,
    pub match_rule: MatchRule,
    pub optional: bool,
}

impl Import {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            version: None,
            match_rule: MatchRule::None,
            optional: false,
        }
    }

    /// Whether `available` satisfies this import's version requirement.
    pub fn is_satisfied_by(&self, available: Version) -> bool {
        match self.version {
            None => true,
            Some(required) => self.match_rule.matches(required, available),
        }
    }
}

/// An extension point declared by a plug-in. `global_id` is
/// `<plugin-id>.<local_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPoint {
    pub local_id: String,
    pub global_id: String,
    pub name: String,
    pub owner_plugin_id: String,
}

/// An extension declared by a plug-in, targeting an extension point by its
/// global id. `global_id` is `<plugin-id>.<local_id>`, local_id is
/// generated from the declaration order when the manifest omits one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub local_id: String,
    pub global_id: String,
    pub point_global_id: String,
    pub name: String,
    pub configuration: ConfigElement,
    pub owner_plugin_id: String,
}

/// A fully parsed plug-in descriptor. Immutable after construction; use
/// [`DescriptorBuilder`] to assemble one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub id: String,
    pub version: Version,
    pub provider_name: Option<String>,
    pub path: std::path::PathBuf,
    pub library: Option<String>,
    pub start_symbol: Option<String>,
    pub stop_symbol: Option<String>,
    pub imports: Vec<Import>,
    pub extension_points: Vec<ExtensionPoint>,
    pub extensions: Vec<Extension>,
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),
    #[error("extension point local id {0:?} declared more than once")]
    DuplicateExtensionPoint(String),
    #[error("extension local id {0:?} declared more than once")]
    DuplicateExtension(String),
}

/// Builds a [`Descriptor`], assigning global ids to extension points and
/// extensions and rejecting duplicate local ids within the plug-in.
pub struct DescriptorBuilder {
    id: String,
    version: Version,
    provider_name: Option<String>,
    path: std::path::PathBuf,
    library: Option<String>,
    start_symbol: Option<String>,
    stop_symbol: Option<String>,
    imports: Vec<Import>,
    extension_points: Vec<(String, String)>,
    extensions: Vec<(String, String, String, ConfigElement)>,
}

impl DescriptorBuilder {
    pub fn new(id: impl Into<String>, path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            id: id.into(),
            version: Version::default(),
            provider_name: None,
            path: path.into(),
            library: None,
            start_symbol: None,
            stop_symbol: None,
            imports: Vec::new(),
            extension_points: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn provider_name(mut self, provider_name: impl Into<String>) -> Self {
        self.provider_name = Some(provider_name.into());
        self
    }

    pub fn runtime(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    pub fn start_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.start_symbol = Some(symbol.into());
        self
    }

    pub fn stop_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.stop_symbol = Some(symbol.into());
        self
    }

    pub fn import(mut self, import: Import) -> Self {
        self.imports.push(import);
        self
    }

    pub fn extension_point(mut self, local_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.extension_points.push((local_id.into(), name.into()));
        self
    }

    pub fn extension(
        mut self,
        local_id: impl Into<String>,
        point_global_id: impl Into<String>,
        name: impl Into<String>,
        configuration: ConfigElement,
    ) -> Self {
        self.extensions.push((
            local_id.into(),
            point_global_id.into(),
            name.into(),
            configuration,
        ));
        self
    }

    pub fn build(self) -> Result<Descriptor, DescriptorError> {
        validate_identifier(&self.id)?;

        let mut seen_points = std::collections::HashSet::new();
        let mut extension_points = Vec::with_capacity(self.extension_points.len());
        for (local_id, name) in self.extension_points {
            validate_identifier(&local_id)?;
            if !seen_points.insert(local_id.clone()) {
                return Err(DescriptorError::DuplicateExtensionPoint(local_id));
            }
            extension_points.push(ExtensionPoint {
                global_id: format!("{}.{}", self.id, local_id),
                local_id,
                name,
                owner_plugin_id: self.id.clone(),
            });
        }

        let mut seen_extensions = std::collections::HashSet::new();
        let mut extensions = Vec::with_capacity(self.extensions.len());
        for (idx, (local_id, point_global_id, name, configuration)) in
            self.extensions.into_iter().enumerate()
        {
            let local_id = if local_id.is_empty() {
                format!("ext{idx}")
            } else {
                local_id
            };
            validate_identifier(&local_id)?;
            if !seen_extensions.insert(local_id.clone()) {
                return Err(DescriptorError::DuplicateExtension(local_id));
            }
            extensions.push(Extension {
                global_id: format!("{}.{}", self.id, local_id),
                local_id,
                point_global_id,
                name,
                configuration,
                owner_plugin_id: self.id.clone(),
            });
        }

        Ok(Descriptor {
            id: self.id,
            version: self.version,
            provider_name: self.provider_name,
            path: self.path,
            library: self.library,
            start_symbol: self.start_symbol,
            stop_symbol: self.stop_symbol,
            imports: self.imports,
            extension_points,
            extensions,
        })
    }
}

/// A reference-counted, host-visible handle to a [`Descriptor`].
///
/// Distinct from ordinary `Rc`/`Arc` drop semantics: the registry itself
/// holds one implicit share while a plug-in is installed, and hosts acquire
/// additional explicit shares via [`DescriptorHandle::share`] that must be
/// released via [`DescriptorHandle::release`]. Releasing a handle that was
/// already released logs and is a no-op rather than panicking, matching the
/// "double free is safe" contract hosts expect from a `release`-style API.
#[derive(Clone)]
pub struct DescriptorHandle {
    descriptor: Rc<Descriptor>,
    released: Rc<Cell<bool>>,
}

impl DescriptorHandle {
    pub fn new(descriptor: Descriptor) -> Self {
        Self {
            descriptor: Rc::new(descriptor),
            released: Rc::new(Cell::new(false)),
        }
    }

    /// Acquire an additional share of this handle. The returned handle must
    /// itself be released independently.
    pub fn share(&self) -> Self {
        Self {
            descriptor: Rc::clone(&self.descriptor),
            released: Rc::new(Cell::new(false)),
        }
    }

    /// Number of live shares across the whole handle family (Rc strong
    /// count), including the registry's own implicit share if any.
    pub fn use_count(&self) -> usize {
        Rc::strong_count(&self.descriptor)
    }

    /// Release this particular share. Double release is a no-op.
    pub fn release(&self) {
        if self.released.replace(true) {
            tracing::debug!(
                target: "core_descriptor.handle",
                plugin_id = %self.descriptor.id,
                "descriptor handle released more than once; ignoring"
            );
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }
}

impl std::ops::Deref for DescriptorHandle {
    type Target = Descriptor;

    fn deref(&self) -> &Self::Target {
        &self.descriptor
    }
}

impl fmt::Debug for DescriptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHandle")
            .field("id", &self.descriptor.id)
            .field("released", &self.released.get())
            .finish()
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        version::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_global_ids() {
        let descriptor = DescriptorBuilder::new("com.example.alpha", "/plugins/alpha")
            .extension_point("points", "Alpha Points")
            .extension("ext1", "com.example.beta.slots", "My Extension", ConfigElement::root())
            .build()
            .unwrap();

        assert_eq!(descriptor.extension_points[0].global_id, "com.example.alpha.points");
        assert_eq!(descriptor.extensions[0].global_id, "com.example.alpha.ext1");
    }

    #[test]
    fn builder_generates_extension_local_id_when_absent() {
        let descriptor = DescriptorBuilder::new("com.example.alpha", "/plugins/alpha")
            .extension("", "com.example.beta.slots", "anon", ConfigElement::root())
            .build()
            .unwrap();
        assert_eq!(descriptor.extensions[0].local_id, "ext0");
    }

    #[test]
    fn duplicate_extension_point_local_id_rejected() {
        let err = DescriptorBuilder::new("com.example.alpha", "/plugins/alpha")
            .extension_point("points", "a")
            .extension_point("points", "b")
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateExtensionPoint(_)));
    }

    #[test]
    fn handle_share_and_double_release() {
        let descriptor = DescriptorBuilder::new("com.example.alpha", "/plugins/alpha")
            .build()
            .unwrap();
        let handle = DescriptorHandle::new(descriptor);
        let share = handle.share();
        assert_eq!(handle.use_count(), 2);
        share.release();
        assert!(share.is_released());
        // Double release: no panic.
        share.release();
        handle.release();
    }

    #[test]
    fn import_satisfaction() {
        let import = Import {
            plugin_id: "com.example.beta".into(),
            version: Some("1.0".parse().unwrap()),
            match_rule: MatchRule::Compatible,
            optional: false,
        };
        assert!(import.is_satisfied_by("1.2".parse().unwrap()));
        assert!(!import.is_satisfied_by("2.0".parse().unwrap()));
    }
}
