//! Extension discovery and lifecycle errors.

use crate::extension::manifest::ManifestError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type ExtensionResult<T> = Result<T, ExtensionError>;

/// Lifecycle hook kind, used in hook failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    Activate,
    Deactivate,
}

impl LifecycleHook {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "on_activate",
            Self::Deactivate => "on_deactivate",
        }
    }
}

/// Errors raised while discovering, loading or notifying extensions.
///
/// Only `DirectoryNotFound` and `NotADirectory` escape bulk operations; the
/// other kinds are logged and recorded per archive or per hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    DirectoryNotFound(PathBuf),
    NotADirectory(PathBuf),
    MalformedManifest {
        archive: PathBuf,
        source: ManifestError,
    },
    IncompatibleTarget {
        archive: PathBuf,
        reason: String,
    },
    LoadFailure {
        archive: PathBuf,
        reason: String,
    },
    HookFailure {
        identity: String,
        hook: LifecycleHook,
        reason: String,
    },
    DuplicateIdentity(String),
}

impl ExtensionError {
    pub(crate) fn load_failure(archive: impl Into<PathBuf>, reason: impl Display) -> Self {
        Self::LoadFailure {
            archive: archive.into(),
            reason: reason.to_string(),
        }
    }
}

impl Display for ExtensionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectoryNotFound(path) => {
                write!(f, "extension directory not found: {}", path.display())
            }
            Self::NotADirectory(path) => {
                write!(f, "extension path is not a directory: {}", path.display())
            }
            Self::MalformedManifest { archive, source } => write!(
                f,
                "archive {} has a malformed manifest: {source}",
                archive.display()
            ),
            Self::IncompatibleTarget { archive, reason } => write!(
                f,
                "archive {} targets an incompatible application: {reason}",
                archive.display()
            ),
            Self::LoadFailure { archive, reason } => {
                write!(f, "failed to load archive {}: {reason}", archive.display())
            }
            Self::HookFailure {
                identity,
                hook,
                reason,
            } => write!(
                f,
                "extension {identity} failed in {}: {reason}",
                hook.as_str()
            ),
            Self::DuplicateIdentity(identity) => {
                write!(f, "extension identity already registered: {identity}")
            }
        }
    }
}

impl Error for ExtensionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedManifest { source, .. } => Some(source),
            _ => None,
        }
    }
}
