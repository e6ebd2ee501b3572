//! Archive discovery and manifest extraction.
//!
//! # Responsibility
//! - Find extension archives under a directory tree.
//! - Extract and parse the single manifest entry of each archive.
//!
//! # Invariants
//! - Discovery order is sorted by path, independent of directory listing order.
//! - A bad archive is skipped and recorded; it never aborts the scan.
//! - Only a missing or non-directory root fails the whole scan.

use crate::extension::error::{ExtensionError, ExtensionResult};
use crate::extension::manifest::{ManifestError, ManifestInfo, MANIFEST_ENTRY_SUFFIX};
use log::{debug, info, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

/// File extension (case-insensitive) identifying extension archives.
pub const ARCHIVE_FILE_EXTENSION: &str = "zip";

/// Archive with a successfully parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCandidate {
    pub archive: PathBuf,
    pub manifest: ManifestInfo,
}

/// Why an archive contributed no extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingManifest,
    MalformedManifest(ManifestError),
    IncompatibleTarget(String),
    LoadFailure(String),
    NoQualifyingUnit,
    AlreadyLoaded(String),
}

impl SkipReason {
    /// Maps a per-archive error onto its skip reason.
    pub fn from_error(err: ExtensionError) -> Self {
        match err {
            ExtensionError::MalformedManifest { source, .. } => Self::MalformedManifest(source),
            ExtensionError::IncompatibleTarget { reason, .. } => Self::IncompatibleTarget(reason),
            ExtensionError::DuplicateIdentity(identity) => Self::AlreadyLoaded(identity),
            other => Self::LoadFailure(other.to_string()),
        }
    }
}

/// Archive that contributed no extension, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedArchive {
    pub archive: PathBuf,
    pub reason: SkipReason,
}

/// Result of scanning one directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Archives with a parsed manifest, sorted by path.
    pub candidates: Vec<ArchiveCandidate>,
    pub skipped: Vec<SkippedArchive>,
}

/// Returns whether `path` has the archive file extension.
pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_FILE_EXTENSION))
}

/// Recursively lists archive files under `root`, sorted by path.
///
/// # Errors
/// - `DirectoryNotFound` when `root` does not exist.
/// - `NotADirectory` when `root` is not a directory.
pub fn find_archives(root: &Path) -> ExtensionResult<Vec<PathBuf>> {
    if !root.exists() {
        return Err(ExtensionError::DirectoryNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ExtensionError::NotADirectory(root.to_path_buf()));
    }

    let mut archives = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    "event=archive_walk module=extension status=skip root={} error={}",
                    root.display(),
                    err
                );
                continue;
            }
        };
        if entry.file_type().is_file() && is_archive_path(entry.path()) {
            archives.push(entry.into_path());
        }
    }
    archives.sort();
    debug!(
        "event=archive_walk module=extension status=ok root={} count={}",
        root.display(),
        archives.len()
    );
    Ok(archives)
}

/// Extracts the manifest of one archive.
///
/// The first non-directory entry whose name ends with `extInfo.json` wins;
/// any later manifest entries are ignored.
///
/// # Errors
/// - `LoadFailure` when the archive cannot be opened or the entry cannot be read.
/// - `MalformedManifest` when the payload is not UTF-8 or does not parse.
pub fn read_manifest(archive: &Path) -> ExtensionResult<Option<ManifestInfo>> {
    let file = File::open(archive).map_err(|err| ExtensionError::load_failure(archive, err))?;
    let mut zip = ZipArchive::new(file).map_err(|err| ExtensionError::load_failure(archive, err))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|err| ExtensionError::load_failure(archive, err))?;
        if entry.is_dir() || !entry.name().ends_with(MANIFEST_ENTRY_SUFFIX) {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| ExtensionError::load_failure(archive, err))?;
        let malformed = |source| ExtensionError::MalformedManifest {
            archive: archive.to_path_buf(),
            source,
        };
        let payload = String::from_utf8(bytes).map_err(|err| {
            malformed(ManifestError::InvalidJson(format!(
                "manifest is not valid UTF-8: {err}"
            )))
        })?;
        return ManifestInfo::parse(&payload).map(Some).map_err(malformed);
    }
    Ok(None)
}

/// Finds archives under `root` and extracts each manifest.
pub fn scan(root: &Path) -> ExtensionResult<ScanOutcome> {
    let mut outcome = ScanOutcome::default();
    for archive in find_archives(root)? {
        match read_manifest(&archive) {
            Ok(Some(manifest)) => {
                debug!(
                    "event=manifest_read module=extension status=ok archive={} name={}",
                    archive.display(),
                    manifest.name()
                );
                outcome
                    .candidates
                    .push(ArchiveCandidate { archive, manifest });
            }
            Ok(None) => {
                info!(
                    "event=manifest_read module=extension status=skip archive={} reason=no_manifest",
                    archive.display()
                );
                outcome.skipped.push(SkippedArchive {
                    archive,
                    reason: SkipReason::MissingManifest,
                });
            }
            Err(err) => {
                warn!(
                    "event=manifest_read module=extension status=skip archive={} error={}",
                    archive.display(),
                    err
                );
                outcome.skipped.push(SkippedArchive {
                    archive,
                    reason: SkipReason::from_error(err),
                });
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{is_archive_path, SkipReason};
    use crate::extension::error::ExtensionError;
    use crate::extension::manifest::ManifestError;
    use std::path::{Path, PathBuf};

    #[test]
    fn archive_extension_is_case_insensitive() {
        assert!(is_archive_path(Path::new("/ext/a.zip")));
        assert!(is_archive_path(Path::new("/ext/A.ZIP")));
        assert!(!is_archive_path(Path::new("/ext/a.zip.bak")));
        assert!(!is_archive_path(Path::new("/ext/zip")));
    }

    #[test]
    fn skip_reason_maps_error_kinds() {
        let malformed = ExtensionError::MalformedManifest {
            archive: PathBuf::from("a.zip"),
            source: ManifestError::MissingField("name"),
        };
        assert_eq!(
            SkipReason::from_error(malformed),
            SkipReason::MalformedManifest(ManifestError::MissingField("name"))
        );

        let failure = ExtensionError::load_failure("b.zip", "corrupt central directory");
        assert!(matches!(
            SkipReason::from_error(failure),
            SkipReason::LoadFailure(reason) if reason.contains("corrupt")
        ));
    }
}
