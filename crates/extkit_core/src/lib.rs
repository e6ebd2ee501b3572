//! Extension lifecycle and configuration reconciliation engine.
//!
//! Discovers extension archives, loads the compatible ones into an
//! [`ExtensionRegistry`], and keeps their enabled state in sync with a host
//! [`SettingsStore`] through the [`ReconciliationBridge`].

pub mod extension;
pub mod logging;
pub mod reconcile;
pub mod settings;

pub use extension::capability::{
    is_valid_capability_id, AppExtension, ExtensionDeclaration, HookResult,
    EXTENSION_ABI_VERSION, EXTENSION_DECLARATION_SYMBOL,
};
pub use extension::compat::is_eligible;
pub use extension::error::{ExtensionError, ExtensionResult, LifecycleHook};
pub use extension::manifest::{ManifestBuilder, ManifestError, ManifestInfo};
pub use extension::options::{LoadOptions, LoadOptionsError};
pub use extension::registry::{ExtensionHandle, ExtensionRegistry, LoadReport};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use reconcile::{enabled_key, ExtensionCatalog, ReconciliationBridge};
pub use settings::{
    layout_version, ConfigProperty, MemorySettingsStore, SettingValue, SettingsError,
    SettingsResult, SettingsStore, SqliteSettingsStore,
};

/// Version a native extension must have been built against.
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    CORE_VERSION
}

#[cfg(test)]
mod tests {
    use super::{core_version, CORE_VERSION};

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
        assert_eq!(core_version(), CORE_VERSION);
    }
}
