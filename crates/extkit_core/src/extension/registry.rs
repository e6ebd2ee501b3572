//! Extension registry and lifecycle state machine.
//!
//! # Responsibility
//! - Own every loaded extension instance together with its enabled flag and
//!   provenance.
//! - Drive discovery (`load_from`) and explicit registration (`register`).
//! - Deliver activation/deactivation notifications.
//!
//! # Invariants
//! - Identities are unique; the first loaded instance of an identity wins.
//! - Enumerations are sorted by manifest name, ties broken by identity.
//! - The sorted index is rebuilt lazily after an insertion or after any
//!   mutable access to an instance, since hooks may change `info()`.
//! - Hook failures (errors or panics) are logged and never abort a transition
//!   or a bulk notification pass.

use crate::extension::archive::{self, SkipReason, SkippedArchive};
use crate::extension::capability::AppExtension;
use crate::extension::compat::check_compatibility;
use crate::extension::error::{ExtensionError, ExtensionResult, LifecycleHook};
use crate::extension::loader::{ArchiveLoad, ExtensionLoader, UnitLibrary, UnitLoader};
use crate::extension::manifest::ManifestInfo;
use crate::extension::options::LoadOptions;
use crate::reconcile::ExtensionCatalog;
use crate::settings::ConfigProperty;
use log::{info, warn};
use once_cell::unsync::OnceCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One loaded extension plus its lifecycle metadata.
pub struct ExtensionHandle {
    identity: String,
    // Declared before `library` so the instance is dropped first.
    instance: Box<dyn AppExtension>,
    source_archive: Option<PathBuf>,
    enabled: bool,
    library: Option<UnitLibrary>,
}

impl ExtensionHandle {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn extension(&self) -> &dyn AppExtension {
        self.instance.as_ref()
    }

    pub fn info(&self) -> &ManifestInfo {
        self.instance.info()
    }

    /// Archive the extension was loaded from; `None` for registered built-ins.
    pub fn source_archive(&self) -> Option<&Path> {
        self.source_archive.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn run_hook(&mut self, hook: LifecycleHook) -> ExtensionResult<()> {
        let instance = &mut self.instance;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match hook {
            LifecycleHook::Activate => instance.on_activate(),
            LifecycleHook::Deactivate => instance.on_deactivate(),
        }));
        let reason = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err.to_string(),
            Err(payload) => {
                if let Some(message) = payload.downcast_ref::<&str>() {
                    format!("panicked: {message}")
                } else if let Some(message) = payload.downcast_ref::<String>() {
                    format!("panicked: {message}")
                } else {
                    "panicked".to_string()
                }
            }
        };
        warn!(
            "event=extension_hook module=extension status=error identity={} hook={} error={}",
            self.identity,
            hook.as_str(),
            reason
        );
        Err(ExtensionError::HookFailure {
            identity: self.identity.clone(),
            hook,
            reason,
        })
    }
}

impl Debug for ExtensionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("identity", &self.identity)
            .field("name", &self.info().name())
            .field("source_archive", &self.source_archive)
            .field("enabled", &self.enabled)
            .field("native", &self.library.is_some())
            .finish()
    }
}

/// Summary of one `load_from` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Identities inserted by this pass, in load (archive path) order.
    pub loaded: Vec<String>,
    /// Archives that contributed nothing, sorted by path.
    pub skipped: Vec<SkippedArchive>,
}

/// Authoritative in-memory table of loaded extensions.
pub struct ExtensionRegistry {
    entries: BTreeMap<String, ExtensionHandle>,
    sorted: OnceCell<Vec<String>>,
    loader: ExtensionLoader,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::with_loader(ExtensionLoader::native())
    }
}

impl ExtensionRegistry {
    /// Registry loading native library units.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(loader: ExtensionLoader) -> Self {
        Self {
            entries: BTreeMap::new(),
            sorted: OnceCell::new(),
            loader,
        }
    }

    pub fn with_unit_loader(unit_loader: impl UnitLoader + 'static) -> Self {
        Self::with_loader(ExtensionLoader::new(Box::new(unit_loader)))
    }

    /// Discovers, filters and loads every eligible archive under `directory`.
    ///
    /// Archives are processed in path order; new extensions start enabled and
    /// no hooks fire. Per-archive problems are recorded in the report.
    ///
    /// # Errors
    /// - `DirectoryNotFound` / `NotADirectory` for an unusable `directory`.
    pub fn load_from(
        &mut self,
        directory: &Path,
        options: &LoadOptions,
    ) -> ExtensionResult<LoadReport> {
        let started_at = Instant::now();
        info!(
            "event=extension_load module=extension status=start dir={} capability={}",
            directory.display(),
            options.capability
        );

        let scan = match archive::scan(directory) {
            Ok(scan) => scan,
            Err(err) => {
                warn!(
                    "event=extension_load module=extension status=error dir={} error={}",
                    directory.display(),
                    err
                );
                return Err(err);
            }
        };

        let mut report = LoadReport {
            loaded: Vec::new(),
            skipped: scan.skipped,
        };
        for candidate in scan.candidates {
            let archive = candidate.archive;
            if let Err(err) = check_compatibility(
                &archive,
                &candidate.manifest,
                options.app_name.as_deref(),
                options.min_version.as_deref(),
            ) {
                report.skipped.push(SkippedArchive {
                    archive,
                    reason: SkipReason::from_error(err),
                });
                continue;
            }

            let entries = &self.entries;
            let outcome = self.loader.try_load_from_archive(
                &archive,
                &options.capability,
                &|identity| entries.contains_key(identity),
            );
            let reason = match outcome {
                Ok(ArchiveLoad::Loaded(loaded)) => {
                    let (identity, instance, library) = loaded.into_parts();
                    if self.entries.contains_key(&identity) {
                        SkipReason::AlreadyLoaded(identity)
                    } else {
                        info!(
                            "event=extension_insert module=extension status=ok identity={} archive={}",
                            identity,
                            archive.display()
                        );
                        report.loaded.push(identity.clone());
                        self.insert(ExtensionHandle {
                            identity,
                            instance,
                            source_archive: Some(archive),
                            enabled: true,
                            library,
                        });
                        continue;
                    }
                }
                Ok(ArchiveLoad::AlreadyLoaded(identity)) => SkipReason::AlreadyLoaded(identity),
                Ok(ArchiveLoad::NoQualifyingUnit) => SkipReason::NoQualifyingUnit,
                Err(err) => {
                    warn!(
                        "event=archive_load module=extension status=error archive={} error={}",
                        archive.display(),
                        err
                    );
                    SkipReason::from_error(err)
                }
            };
            report.skipped.push(SkippedArchive { archive, reason });
        }

        report
            .skipped
            .sort_by(|left, right| left.archive.cmp(&right.archive));
        info!(
            "event=extension_load module=extension status=ok dir={} loaded={} skipped={} duration_ms={}",
            directory.display(),
            report.loaded.len(),
            report.skipped.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Registers a compiled-in extension under its type name.
    pub fn register<E>(&mut self, extension: E, enabled: bool) -> ExtensionResult<()>
    where
        E: AppExtension + 'static,
    {
        self.register_boxed(std::any::type_name::<E>(), Box::new(extension), enabled)
    }

    /// Registers a pre-boxed extension under an explicit identity.
    ///
    /// # Errors
    /// - `DuplicateIdentity` when `identity` is already present; the registry
    ///   is left unchanged.
    pub fn register_boxed(
        &mut self,
        identity: impl Into<String>,
        instance: Box<dyn AppExtension>,
        enabled: bool,
    ) -> ExtensionResult<()> {
        let identity = identity.into();
        if self.entries.contains_key(&identity) {
            return Err(ExtensionError::DuplicateIdentity(identity));
        }
        info!(
            "event=extension_insert module=extension status=ok identity={} source=builtin enabled={}",
            identity, enabled
        );
        self.insert(ExtensionHandle {
            identity,
            instance,
            source_archive: None,
            enabled,
            library: None,
        });
        Ok(())
    }

    fn insert(&mut self, handle: ExtensionHandle) {
        self.entries.insert(handle.identity.clone(), handle);
        self.sorted.take();
    }

    /// Enables or disables one extension.
    ///
    /// Returns `true` only on a real transition. With `notify`, the matching
    /// hook runs after the flag flips; its failure is logged, not returned.
    pub fn set_enabled(&mut self, identity: &str, enabled: bool, notify: bool) -> bool {
        let Some(handle) = self.entries.get_mut(identity) else {
            return false;
        };
        if handle.enabled == enabled {
            return false;
        }

        handle.enabled = enabled;
        info!(
            "event=extension_toggle module=extension status=ok identity={} enabled={} notify={}",
            identity, enabled, notify
        );
        if notify {
            let hook = if enabled {
                LifecycleHook::Activate
            } else {
                LifecycleHook::Deactivate
            };
            let _ = handle.run_hook(hook);
            self.sorted.take();
        }
        true
    }

    /// Runs `on_activate` on every enabled extension, in sorted order.
    ///
    /// Returns the hook failures that were caught.
    pub fn activate_all(&mut self) -> Vec<ExtensionError> {
        self.notify_enabled(LifecycleHook::Activate)
    }

    /// Runs `on_deactivate` on every enabled extension, in sorted order.
    pub fn deactivate_all(&mut self) -> Vec<ExtensionError> {
        self.notify_enabled(LifecycleHook::Deactivate)
    }

    fn notify_enabled(&mut self, hook: LifecycleHook) -> Vec<ExtensionError> {
        let identities = self.sorted_identities().to_vec();
        let mut failures = Vec::new();
        for identity in identities {
            let Some(handle) = self.entries.get_mut(&identity) else {
                continue;
            };
            if !handle.enabled {
                continue;
            }
            if let Err(err) = handle.run_hook(hook) {
                failures.push(err);
            }
        }
        self.sorted.take();
        failures
    }

    fn sorted_identities(&self) -> &[String] {
        self.sorted.get_or_init(|| {
            let mut handles: Vec<&ExtensionHandle> = self.entries.values().collect();
            handles.sort_by(|left, right| {
                left.info()
                    .name()
                    .cmp(right.info().name())
                    .then_with(|| left.identity.cmp(&right.identity))
            });
            handles
                .into_iter()
                .map(|handle| handle.identity.clone())
                .collect()
        })
    }

    /// All handles, sorted by manifest name.
    pub fn all(&self) -> Vec<&ExtensionHandle> {
        self.sorted_identities()
            .iter()
            .filter_map(|identity| self.entries.get(identity))
            .collect()
    }

    /// Enabled handles, sorted by manifest name.
    pub fn enabled(&self) -> Vec<&ExtensionHandle> {
        self.all()
            .into_iter()
            .filter(|handle| handle.enabled)
            .collect()
    }

    pub fn get(&self, identity: &str) -> Option<&ExtensionHandle> {
        self.entries.get(identity)
    }

    pub fn extension(&self, identity: &str) -> Option<&dyn AppExtension> {
        self.get(identity).map(ExtensionHandle::extension)
    }

    /// Mutable access to one instance. Drops the cached order.
    pub fn extension_mut(
        &mut self,
        identity: &str,
    ) -> Option<&mut (dyn AppExtension + 'static)> {
        self.sorted.take();
        self.entries
            .get_mut(identity)
            .map(|handle| handle.instance.as_mut())
    }

    pub fn source_archive_of(&self, identity: &str) -> Option<&Path> {
        self.get(identity).and_then(ExtensionHandle::source_archive)
    }

    pub fn is_loaded(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// `false` for unknown identities.
    pub fn is_enabled(&self, identity: &str) -> bool {
        self.get(identity).is_some_and(|handle| handle.enabled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configuration entries of every enabled extension, in sorted order.
    ///
    /// Entries sharing a key are all kept; consumers that fold them into a
    /// keyed store see later entries shadow earlier ones.
    pub fn collect_configuration(&self) -> Vec<ConfigProperty> {
        self.enabled()
            .into_iter()
            .flat_map(|handle| handle.extension().config_properties())
            .collect()
    }
}

impl Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.all())
            .finish()
    }
}

impl ExtensionCatalog for ExtensionRegistry {
    fn loaded_identities(&self) -> Vec<String> {
        self.sorted_identities().to_vec()
    }

    fn is_extension_enabled(&self, identity: &str) -> bool {
        self.is_enabled(identity)
    }

    fn set_extension_enabled(&mut self, identity: &str, enabled: bool, notify: bool) -> bool {
        self.set_enabled(identity, enabled, notify)
    }

    fn configuration_entries_of(&self, identity: &str) -> Vec<ConfigProperty> {
        self.extension(identity)
            .map(|extension| extension.config_properties())
            .unwrap_or_default()
    }
}
