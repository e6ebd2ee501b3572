//! Extension discovery, loading and lifecycle.
//!
//! Flow of one discovery pass:
//! `archive::scan` -> `compat::check_compatibility` -> `loader` -> `registry`.
//!
//! Native extensions are shared libraries packed into `.zip` archives next to
//! an `extInfo.json` manifest; each library exports its declaration through
//! [`export_extension!`](crate::export_extension).

pub mod archive;
pub mod capability;
pub mod compat;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod options;
pub mod registry;

pub use archive::{ArchiveCandidate, ScanOutcome, SkipReason, SkippedArchive};
pub use capability::{AppExtension, ExtensionDeclaration, HookResult};
pub use error::{ExtensionError, ExtensionResult, LifecycleHook};
pub use loader::{
    ArchiveLoad, CodeUnit, ExtensionLoader, LoadContext, LoadedExtension, NativeUnitLoader,
    UnitDeclaration, UnitLoader,
};
pub use manifest::{ManifestBuilder, ManifestError, ManifestInfo};
pub use options::{LoadOptions, LoadOptionsError};
pub use registry::{ExtensionHandle, ExtensionRegistry, LoadReport};
