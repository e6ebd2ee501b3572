//! Extension instantiation from archive code units.
//!
//! # Responsibility
//! - Enumerate code units of one archive in archive order.
//! - Resolve each unit's declaration through a pluggable `UnitLoader`.
//! - Instantiate the first unit whose capability matches and whose identity is
//!   not loaded yet.
//!
//! # Invariants
//! - Every archive gets its own loading context (a private temp directory), so
//!   units of different archives never collide on file names.
//! - At most one extension is produced per archive.
//! - Panics raised by unit code while declaring or constructing are caught and
//!   reported as `LoadFailure`.
//! - A produced instance never outlives the library that holds its code.

use crate::extension::capability::{
    AppExtension, ExtensionDeclaration, EXTENSION_ABI_VERSION, EXTENSION_DECLARATION_SYMBOL,
};
use crate::extension::error::{ExtensionError, ExtensionResult};
use crate::CORE_VERSION;
use libloading::Library;
use log::{debug, info, warn};
use std::any::Any;
use std::fs::File;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipArchive;

const NATIVE_UNIT_SUFFIXES: &[&str] = &[".so", ".dylib", ".dll"];

/// Raw bytes of one code unit read from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    /// Position of the entry in archive enumeration order.
    pub index: usize,
    /// Archive-internal entry name.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Isolated loading context for the code units of one archive.
pub struct LoadContext {
    archive: PathBuf,
    dir: TempDir,
}

impl LoadContext {
    pub fn new(archive: &Path) -> ExtensionResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("extkit-unit-")
            .tempdir()
            .map_err(|err| ExtensionError::load_failure(archive, err))?;
        Ok(Self {
            archive: archive.to_path_buf(),
            dir,
        })
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn directory(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `unit` into this context's directory and returns the file path.
    pub fn materialize(&self, unit: &CodeUnit) -> ExtensionResult<PathBuf> {
        let file_name = Path::new(&unit.name)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unit");
        let path = self
            .dir
            .path()
            .join(format!("{:04}-{}", unit.index, file_name));
        std::fs::write(&path, &unit.bytes)
            .map_err(|err| ExtensionError::load_failure(&self.archive, err))?;
        Ok(path)
    }
}

/// Library kept resident for as long as an instance created from it lives.
pub(crate) struct UnitLibrary(#[allow(dead_code)] Library);

/// Declaration resolved from one code unit, not yet instantiated.
pub struct UnitDeclaration {
    identity: String,
    capability: String,
    factory: Box<dyn FnOnce() -> Box<dyn AppExtension>>,
    library: Option<Library>,
}

impl UnitDeclaration {
    /// Declaration backed by in-process code (no library to keep alive).
    pub fn new(
        identity: impl Into<String>,
        capability: impl Into<String>,
        factory: impl FnOnce() -> Box<dyn AppExtension> + 'static,
    ) -> Self {
        Self {
            identity: identity.into(),
            capability: capability.into(),
            factory: Box::new(factory),
            library: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }
}

/// Resolves code units into extension declarations.
pub trait UnitLoader {
    /// Whether the archive entry `entry_name` is a code unit worth resolving.
    fn is_code_unit(&self, entry_name: &str) -> bool {
        NATIVE_UNIT_SUFFIXES
            .iter()
            .any(|suffix| entry_name.ends_with(suffix))
    }

    /// Resolves one unit. `Ok(None)` means the unit declares no extension.
    fn declare(
        &self,
        context: &LoadContext,
        unit: &CodeUnit,
    ) -> ExtensionResult<Option<UnitDeclaration>>;
}

/// Loads native dynamic libraries exporting an `ExtensionDeclaration`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeUnitLoader;

impl UnitLoader for NativeUnitLoader {
    fn declare(
        &self,
        context: &LoadContext,
        unit: &CodeUnit,
    ) -> ExtensionResult<Option<UnitDeclaration>> {
        let path = context.materialize(unit)?;
        let unit_failure = |reason: String| {
            ExtensionError::load_failure(context.archive(), format!("{}: {reason}", unit.name))
        };

        // SAFETY: loading runs the library's initializers; extension archives
        // are trusted host content.
        let library =
            unsafe { Library::new(&path) }.map_err(|err| unit_failure(err.to_string()))?;

        // SAFETY: the symbol is the address of the exported declaration static.
        let declaration_ptr = match unsafe {
            library.get::<*const ExtensionDeclaration>(EXTENSION_DECLARATION_SYMBOL)
        } {
            Ok(symbol) => *symbol,
            Err(_) => {
                debug!(
                    "event=unit_declare module=extension status=skip archive={} unit={} reason=no_declaration",
                    context.archive().display(),
                    unit.name
                );
                return Ok(None);
            }
        };
        // SAFETY: the static lives as long as `library`, which outlives this borrow.
        let declaration = unsafe { &*declaration_ptr };

        if declaration.abi_version != EXTENSION_ABI_VERSION {
            return Err(unit_failure(format!(
                "abi version {} does not match host abi version {}",
                declaration.abi_version, EXTENSION_ABI_VERSION
            )));
        }
        if declaration.core_version != CORE_VERSION {
            return Err(unit_failure(format!(
                "built against extkit_core {} but host runs {}",
                declaration.core_version, CORE_VERSION
            )));
        }

        let identity_fn = declaration.identity;
        let identity = match panic::catch_unwind(identity_fn) {
            Ok(identity) => identity.to_string(),
            Err(payload) => {
                let message = panic_message(payload);
                return Err(unit_failure(format!("identity lookup panicked: {message}")));
            }
        };
        let capability = declaration.capability.to_string();
        let create = declaration.create;

        Ok(Some(UnitDeclaration {
            identity,
            capability,
            factory: Box::new(create),
            library: Some(library),
        }))
    }
}

/// Extension instantiated from an archive.
pub struct LoadedExtension {
    identity: String,
    instance: Box<dyn AppExtension>,
    library: Option<UnitLibrary>,
}

impl LoadedExtension {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn instance(&self) -> &dyn AppExtension {
        self.instance.as_ref()
    }

    pub(crate) fn into_parts(self) -> (String, Box<dyn AppExtension>, Option<UnitLibrary>) {
        (self.identity, self.instance, self.library)
    }
}

/// Outcome of loading one archive.
pub enum ArchiveLoad {
    Loaded(LoadedExtension),
    /// Every qualifying unit declared an identity that is already loaded.
    AlreadyLoaded(String),
    NoQualifyingUnit,
}

/// Instantiates extensions from archives.
pub struct ExtensionLoader {
    unit_loader: Box<dyn UnitLoader>,
}

impl Default for ExtensionLoader {
    fn default() -> Self {
        Self::native()
    }
}

impl ExtensionLoader {
    pub fn new(unit_loader: Box<dyn UnitLoader>) -> Self {
        Self { unit_loader }
    }

    /// Loader for native dynamic library units.
    pub fn native() -> Self {
        Self::new(Box::new(NativeUnitLoader))
    }

    /// Loads the extension of `archive`, logging and swallowing any failure.
    pub fn load_from_archive(
        &self,
        archive: &Path,
        capability: &str,
        is_loaded: &dyn Fn(&str) -> bool,
    ) -> Option<LoadedExtension> {
        match self.try_load_from_archive(archive, capability, is_loaded) {
            Ok(ArchiveLoad::Loaded(loaded)) => Some(loaded),
            Ok(_) => None,
            Err(err) => {
                warn!(
                    "event=archive_load module=extension status=error archive={} error={}",
                    archive.display(),
                    err
                );
                None
            }
        }
    }

    /// Loads the extension of `archive`, reporting why nothing was loaded.
    ///
    /// Units are examined in archive order; the first unit declaring
    /// `capability` with an identity for which `is_loaded` is false wins.
    pub fn try_load_from_archive(
        &self,
        archive: &Path,
        capability: &str,
        is_loaded: &dyn Fn(&str) -> bool,
    ) -> ExtensionResult<ArchiveLoad> {
        let file = File::open(archive).map_err(|err| ExtensionError::load_failure(archive, err))?;
        let mut zip =
            ZipArchive::new(file).map_err(|err| ExtensionError::load_failure(archive, err))?;
        let context = LoadContext::new(archive)?;
        let mut already_loaded = None;

        for index in 0..zip.len() {
            let unit = {
                let mut entry = zip
                    .by_index(index)
                    .map_err(|err| ExtensionError::load_failure(archive, err))?;
                if entry.is_dir() || !self.unit_loader.is_code_unit(entry.name()) {
                    continue;
                }
                let name = entry.name().to_string();
                let mut bytes = Vec::new();
                entry
                    .read_to_end(&mut bytes)
                    .map_err(|err| ExtensionError::load_failure(archive, err))?;
                CodeUnit { index, name, bytes }
            };

            let declared =
                panic::catch_unwind(AssertUnwindSafe(|| self.unit_loader.declare(&context, &unit)));
            let declaration = match declared {
                Ok(Ok(Some(declaration))) => declaration,
                Ok(Ok(None)) => continue,
                Ok(Err(err)) => return Err(err),
                Err(payload) => {
                    let message = panic_message(payload);
                    return Err(ExtensionError::load_failure(
                        archive,
                        format!("{}: declaration panicked: {message}", unit.name),
                    ));
                }
            };

            if declaration.capability != capability {
                debug!(
                    "event=unit_declare module=extension status=skip archive={} unit={} capability={}",
                    archive.display(),
                    unit.name,
                    declaration.capability
                );
                continue;
            }
            if is_loaded(declaration.identity.as_str()) {
                info!(
                    "event=unit_declare module=extension status=skip archive={} identity={} reason=already_loaded",
                    archive.display(),
                    declaration.identity
                );
                already_loaded = Some(declaration.identity);
                continue;
            }

            debug!(
                "event=unit_declare module=extension status=ok archive={} unit={} identity={}",
                archive.display(),
                unit.name,
                declaration.identity
            );
            return instantiate(archive, declaration).map(ArchiveLoad::Loaded);
        }

        match already_loaded {
            Some(identity) => Ok(ArchiveLoad::AlreadyLoaded(identity)),
            None => {
                warn!(
                    "event=archive_load module=extension status=skip archive={} reason=no_qualifying_unit capability={}",
                    archive.display(),
                    capability
                );
                Ok(ArchiveLoad::NoQualifyingUnit)
            }
        }
    }
}

fn instantiate(archive: &Path, declaration: UnitDeclaration) -> ExtensionResult<LoadedExtension> {
    let UnitDeclaration {
        identity,
        factory,
        library,
        ..
    } = declaration;

    // `library` must outlive both the instance and any panic payload built by its code.
    match panic::catch_unwind(AssertUnwindSafe(factory)) {
        Ok(instance) => Ok(LoadedExtension {
            identity,
            instance,
            library: library.map(UnitLibrary),
        }),
        Err(payload) => {
            let message = panic_message(payload);
            Err(ExtensionError::load_failure(
                archive,
                format!("constructor of {identity} panicked: {message}"),
            ))
        }
    }
}

/// Extracts a printable message and drops the payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
