//! Capability contract implemented by every extension.
//!
//! An extension archive carries native code units. A unit qualifies when it
//! exports an [`ExtensionDeclaration`] under [`EXTENSION_DECLARATION_SYMBOL`]
//! whose capability id matches the one the host asks for. Extension crates
//! produce the declaration with [`export_extension!`](crate::export_extension).
//!
//! Units must be built with the same toolchain and `extkit_core` version as
//! the host: the declaration hands a Rust trait object across the boundary.

use crate::extension::manifest::ManifestInfo;
use crate::settings::ConfigProperty;
use std::error::Error;

/// Result of a lifecycle hook. Errors are logged by the registry and never
/// interrupt the enable/disable transition.
pub type HookResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Capability interface every loaded extension implements.
pub trait AppExtension {
    /// Manifest metadata describing this extension.
    fn info(&self) -> &ManifestInfo;

    /// Configuration entries owned by this extension, possibly empty.
    fn config_properties(&self) -> Vec<ConfigProperty> {
        Vec::new()
    }

    /// Invoked when the extension transitions to enabled, and at host startup.
    fn on_activate(&mut self) -> HookResult {
        Ok(())
    }

    /// Invoked when the extension transitions to disabled, and at host shutdown.
    fn on_deactivate(&mut self) -> HookResult {
        Ok(())
    }
}

/// Bumped whenever `ExtensionDeclaration` or `AppExtension` change shape.
pub const EXTENSION_ABI_VERSION: u32 = 1;

/// Exported symbol name (NUL-terminated) of the declaration static.
pub const EXTENSION_DECLARATION_SYMBOL: &[u8] = b"EXTKIT_EXTENSION_DECLARATION\0";

/// Registration entry point exported by a native code unit.
pub struct ExtensionDeclaration {
    pub abi_version: u32,
    /// `extkit_core` version the unit was compiled against.
    pub core_version: &'static str,
    /// Capability id this unit satisfies.
    pub capability: &'static str,
    /// Fully qualified type name of the implementation.
    pub identity: fn() -> &'static str,
    pub create: fn() -> Box<dyn AppExtension>,
}

/// Declares the extension exported by a `cdylib` crate.
///
/// ```ignore
/// extkit_core::export_extension!(ImageTools, "viewer.extension", ImageTools::new());
/// ```
#[macro_export]
macro_rules! export_extension {
    ($ty:ty, $capability:expr, $ctor:expr) => {
        #[no_mangle]
        pub static EXTKIT_EXTENSION_DECLARATION: $crate::ExtensionDeclaration =
            $crate::ExtensionDeclaration {
                abi_version: $crate::EXTENSION_ABI_VERSION,
                core_version: $crate::CORE_VERSION,
                capability: $capability,
                identity: || ::std::any::type_name::<$ty>(),
                create: || -> ::std::boxed::Box<dyn $crate::AppExtension> {
                    ::std::boxed::Box::new($ctor)
                },
            };
    };
}

/// Returns whether `value` is a well-formed capability id
/// (`[a-z0-9]` segments joined by single `.`, `_` or `-`).
pub fn is_valid_capability_id(value: &str) -> bool {
    let mut chars = value.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }

    let mut prev_separator = false;
    for c in chars {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_separator = false;
            continue;
        }
        if matches!(c, '.' | '_' | '-') && !prev_separator {
            prev_separator = true;
            continue;
        }
        return false;
    }
    !prev_separator
}
