#![allow(dead_code)]

use extkit_core::extension::{CodeUnit, LoadContext, UnitDeclaration, UnitLoader};
use extkit_core::{
    AppExtension, ConfigProperty, ExtensionResult, HookResult, ManifestBuilder, ManifestInfo,
};
use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const CAPABILITY: &str = "viewer.extension";

pub type EventLog = Rc<RefCell<Vec<String>>>;

/// Writes a zip archive with the given `(entry name, contents)` pairs.
pub fn write_archive(path: &Path, entries: &[(&str, &str)]) -> PathBuf {
    let entries: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, contents)| (*name, contents.as_bytes()))
        .collect();
    write_archive_bytes(path, &entries)
}

pub fn write_archive_bytes(path: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create archive parent");
    }
    let file = File::create(path).expect("create archive file");
    let mut zip = ZipWriter::new(file);
    for (name, contents) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("start archive entry");
        zip.write_all(contents).expect("write archive entry");
    }
    zip.finish().expect("finish archive");
    path.to_path_buf()
}

pub fn manifest_json(name: &str, app_name: &str, app_version: Option<&str>) -> String {
    let mut builder = ManifestBuilder::new(name, app_name)
        .author("Test Author")
        .version("1.0.0");
    if let Some(version) = app_version {
        builder = builder.target_app_version(version);
    }
    builder.build().expect("test manifest").to_json()
}

/// Scripted unit payload understood by `ScriptedUnitLoader`.
///
/// One `key=value` per line: `identity`, `capability`, `name`, optional
/// `property` (boolean config key) and `panic` (`declare` or `create`).
pub fn unit_script(identity: &str, capability: &str, name: &str) -> String {
    format!("identity={identity}\ncapability={capability}\nname={name}\n")
}

/// Archive with a manifest and one scripted unit.
pub fn write_extension(
    dir: &Path,
    file_name: &str,
    identity: &str,
    name: &str,
    app_version: Option<&str>,
) -> PathBuf {
    let manifest = manifest_json(name, "Viewer", app_version);
    let unit = unit_script(identity, CAPABILITY, name);
    write_archive(
        &dir.join(file_name),
        &[
            ("META-INF/extInfo.json", manifest.as_str()),
            ("lib/main.unit", unit.as_str()),
        ],
    )
}

/// In-process unit loader driven by `.unit` text entries.
pub struct ScriptedUnitLoader {
    events: EventLog,
}

impl ScriptedUnitLoader {
    pub fn new(events: &EventLog) -> Self {
        Self {
            events: Rc::clone(events),
        }
    }
}

impl UnitLoader for ScriptedUnitLoader {
    fn is_code_unit(&self, entry_name: &str) -> bool {
        entry_name.ends_with(".unit")
    }

    fn declare(
        &self,
        context: &LoadContext,
        unit: &CodeUnit,
    ) -> ExtensionResult<Option<UnitDeclaration>> {
        assert!(context.directory().is_dir());
        let script = String::from_utf8(unit.bytes.clone()).expect("utf8 unit script");
        let field = |key: &str| {
            script.lines().find_map(|line| {
                line.strip_prefix(key)
                    .and_then(|rest| rest.strip_prefix('='))
                    .map(str::to_string)
            })
        };

        let Some(identity) = field("identity") else {
            return Ok(None);
        };
        if field("panic").as_deref() == Some("declare") {
            panic!("unit {} refused to declare", unit.name);
        }
        let capability = field("capability").unwrap_or_default();
        let name = field("name").unwrap_or_else(|| identity.clone());
        let property = field("property");
        let panic_on_create = field("panic").as_deref() == Some("create");
        let events = Rc::clone(&self.events);

        Ok(Some(UnitDeclaration::new(
            identity,
            capability,
            move || -> Box<dyn AppExtension> {
                if panic_on_create {
                    panic!("constructor exploded");
                }
                Box::new(RecordingExtension::new(&name, property, events))
            },
        )))
    }
}

/// Extension that records lifecycle hooks into a shared log.
pub struct RecordingExtension {
    info: ManifestInfo,
    property: Option<String>,
    events: EventLog,
}

impl RecordingExtension {
    pub fn new(name: &str, property: Option<String>, events: EventLog) -> Self {
        Self {
            info: ManifestBuilder::new(name, "Viewer")
                .build()
                .expect("recording manifest"),
            property,
            events,
        }
    }
}

impl AppExtension for RecordingExtension {
    fn info(&self) -> &ManifestInfo {
        &self.info
    }

    fn config_properties(&self) -> Vec<ConfigProperty> {
        self.property
            .iter()
            .map(|key| ConfigProperty::boolean(key.clone(), "Flag", true))
            .collect()
    }

    fn on_activate(&mut self) -> HookResult {
        self.events
            .borrow_mut()
            .push(format!("activate:{}", self.info.name()));
        Ok(())
    }

    fn on_deactivate(&mut self) -> HookResult {
        self.events
            .borrow_mut()
            .push(format!("deactivate:{}", self.info.name()));
        Ok(())
    }
}
