//! Target-application compatibility filter.
//!
//! Version comparison is numeric-only and best effort: both sides are parsed
//! as floating-point numbers, so `1.10` compares lower than `1.9`.

use crate::extension::error::ExtensionError;
use crate::extension::manifest::ManifestInfo;
use log::warn;
use std::path::Path;

/// Version assumed when a manifest omits `targetAppVersion`.
const MISSING_TARGET_VERSION: f32 = -1.0;

/// Returns whether `manifest` may be loaded by the given application.
///
/// `None` disables the corresponding check. Rejections are logged at warning.
pub fn is_eligible(
    manifest: &ManifestInfo,
    app_name: Option<&str>,
    min_version: Option<&str>,
) -> bool {
    check_compatibility(Path::new(""), manifest, app_name, min_version).is_ok()
}

/// Same rules as [`is_eligible`], reporting the rejection reason for `archive`.
pub fn check_compatibility(
    archive: &Path,
    manifest: &ManifestInfo,
    app_name: Option<&str>,
    min_version: Option<&str>,
) -> Result<(), ExtensionError> {
    if let Some(app_name) = app_name {
        if manifest.target_app_name() != app_name {
            let reason = format!(
                "target app name `{}` does not match `{}`",
                manifest.target_app_name(),
                app_name
            );
            return Err(reject(archive, reason));
        }
    }

    let Some(min_version) = min_version else {
        return Ok(());
    };

    let required = parse_version(min_version);
    let offered = match manifest.target_app_version() {
        Some(raw) => parse_version(raw),
        None => Some(MISSING_TARGET_VERSION),
    };
    match (required, offered) {
        (Some(required), Some(offered)) if offered < required => {
            let reason = format!(
                "targets version `{}`, below the required `{}`",
                manifest.target_app_version().unwrap_or("<none>"),
                min_version
            );
            Err(reject(archive, reason))
        }
        (Some(_), Some(_)) => Ok(()),
        _ => {
            let reason = format!(
                "unable to compare versions: app requires `{}`, extension targets `{}`",
                min_version,
                manifest.target_app_version().unwrap_or("<none>")
            );
            Err(reject(archive, reason))
        }
    }
}

fn parse_version(raw: &str) -> Option<f32> {
    raw.trim().parse::<f32>().ok()
}

fn reject(archive: &Path, reason: String) -> ExtensionError {
    warn!(
        "event=compat_check module=extension status=skip archive={} reason={}",
        archive.display(),
        reason
    );
    ExtensionError::IncompatibleTarget {
        archive: archive.to_path_buf(),
        reason,
    }
}
