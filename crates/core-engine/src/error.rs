use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("plug-in {importer:?} requires {target:?}, which is not installed")]
    Missing { importer: String, target: String },
    #[error(
        "plug-in {importer:?} requires {target:?} at a version incompatible with the installed {actual}"
    )]
    VersionMismatch {
        importer: String,
        target: String,
        actual: core_descriptor::Version,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to bind runtime library for plug-in {plugin_id:?}: {source}")]
    Binding {
        plugin_id: String,
        #[source]
        source: core_loader::LoaderError,
    },
    #[error("plug-in {plugin_id:?} start function returned failure")]
    StartFailed { plugin_id: String },
}

/// Classified error surface for every fallible context operation. See
/// [`ErrorKind`] for the kind a host would match on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),
    #[error("unknown plug-in or extension point: {0}")]
    Unknown(String),
    #[error("I/O error scanning {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed descriptor at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),
}

/// The classification a host matches on, independent of the human-readable
/// message carried by [`Error`]. Mirrors the status-code families of the
/// embedding API's language-neutral shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ResourceExhaustion,
    Unknown,
    Io,
    Malformed,
    Conflict,
    Dependency,
    Runtime,
    InvalidInvocation,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ResourceExhaustion(_) => ErrorKind::ResourceExhaustion,
            Error::Unknown(_) => ErrorKind::Unknown,
            Error::Io { .. } => ErrorKind::Io,
            Error::Malformed { .. } => ErrorKind::Malformed,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Dependency(_) => ErrorKind::Dependency,
            Error::Runtime(_) => ErrorKind::Runtime,
            Error::InvalidInvocation(_) => ErrorKind::InvalidInvocation,
        }
    }
}
