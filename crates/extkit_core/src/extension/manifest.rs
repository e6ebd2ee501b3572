//! Extension manifest model and payload parsing.
//!
//! # Responsibility
//! - Parse the JSON manifest payload shipped inside each extension archive.
//! - Expose an immutable metadata record to the registry and compatibility filter.
//!
//! # Invariants
//! - A `ManifestInfo` is only produced by `parse` or `ManifestBuilder::build`,
//!   never partially populated.
//! - `name` and `target_app_name` are non-blank.
//! - `custom_fields` keeps payload document order.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Manifest entry names inside an archive end with this suffix.
pub const MANIFEST_ENTRY_SUFFIX: &str = "extInfo.json";

/// Parsed, immutable metadata for one extension package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestInfo {
    name: String,
    author: String,
    version: String,
    target_app_name: String,
    target_app_version: Option<String>,
    short_description: String,
    long_description: String,
    release_notes: String,
    custom_fields: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    name: Option<String>,
    author: Option<String>,
    version: Option<String>,
    target_app_name: Option<String>,
    target_app_version: Option<String>,
    short_description: Option<String>,
    long_description: Option<String>,
    release_notes: Option<String>,
    custom_fields: Option<Map<String, Value>>,
}

impl ManifestInfo {
    /// Parses one manifest payload.
    ///
    /// # Errors
    /// - `InvalidJson` when the payload is not a JSON object of the expected shape.
    /// - `MissingField` when `name` or `targetAppName` is absent or blank.
    /// - `InvalidCustomField` when a `customFields` value is not a string.
    pub fn parse(payload: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(payload)
            .map_err(|err| ManifestError::InvalidJson(err.to_string()))?;

        let mut custom_fields = Vec::new();
        for (key, value) in raw.custom_fields.unwrap_or_default() {
            match value {
                Value::String(text) => custom_fields.push((key, text)),
                _ => return Err(ManifestError::InvalidCustomField(key)),
            }
        }

        let mut builder = ManifestBuilder::new(
            raw.name.unwrap_or_default(),
            raw.target_app_name.unwrap_or_default(),
        )
        .author(raw.author.unwrap_or_default())
        .version(raw.version.unwrap_or_default())
        .short_description(raw.short_description.unwrap_or_default())
        .long_description(raw.long_description.unwrap_or_default())
        .release_notes(raw.release_notes.unwrap_or_default());
        if let Some(target_version) = raw.target_app_version {
            builder = builder.target_app_version(target_version);
        }
        for (key, value) in custom_fields {
            builder = builder.custom_field(key, value);
        }
        builder.build()
    }

    /// Serializes this manifest back into the payload format accepted by `parse`.
    pub fn to_json(&self) -> String {
        let mut custom = Map::new();
        for (key, value) in &self.custom_fields {
            custom.insert(key.clone(), Value::String(value.clone()));
        }

        let mut root = Map::new();
        root.insert("name".into(), Value::String(self.name.clone()));
        root.insert("author".into(), Value::String(self.author.clone()));
        root.insert("version".into(), Value::String(self.version.clone()));
        root.insert(
            "targetAppName".into(),
            Value::String(self.target_app_name.clone()),
        );
        if let Some(target_version) = &self.target_app_version {
            root.insert(
                "targetAppVersion".into(),
                Value::String(target_version.clone()),
            );
        }
        root.insert(
            "shortDescription".into(),
            Value::String(self.short_description.clone()),
        );
        root.insert(
            "longDescription".into(),
            Value::String(self.long_description.clone()),
        );
        root.insert(
            "releaseNotes".into(),
            Value::String(self.release_notes.clone()),
        );
        root.insert("customFields".into(), Value::Object(custom));
        Value::Object(root).to_string()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn target_app_name(&self) -> &str {
        &self.target_app_name
    }

    /// Free-form target version string; `None` when the payload omits it.
    pub fn target_app_version(&self) -> Option<&str> {
        self.target_app_version.as_deref()
    }

    pub fn short_description(&self) -> &str {
        &self.short_description
    }

    pub fn long_description(&self) -> &str {
        &self.long_description
    }

    pub fn release_notes(&self) -> &str {
        &self.release_notes
    }

    /// Custom fields in payload order.
    pub fn custom_fields(&self) -> &[(String, String)] {
        &self.custom_fields
    }

    /// Returns the first custom field value stored under `name`.
    pub fn custom_field(&self, name: &str) -> Option<&str> {
        self.custom_fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Validating builder for manifests of compiled-in extensions.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    info: ManifestInfo,
}

impl ManifestBuilder {
    pub fn new(name: impl Into<String>, target_app_name: impl Into<String>) -> Self {
        Self {
            info: ManifestInfo {
                name: name.into(),
                author: String::new(),
                version: String::new(),
                target_app_name: target_app_name.into(),
                target_app_version: None,
                short_description: String::new(),
                long_description: String::new(),
                release_notes: String::new(),
                custom_fields: Vec::new(),
            },
        }
    }

    pub fn author(mut self, value: impl Into<String>) -> Self {
        self.info.author = value.into();
        self
    }

    pub fn version(mut self, value: impl Into<String>) -> Self {
        self.info.version = value.into();
        self
    }

    pub fn target_app_version(mut self, value: impl Into<String>) -> Self {
        self.info.target_app_version = Some(value.into());
        self
    }

    pub fn short_description(mut self, value: impl Into<String>) -> Self {
        self.info.short_description = value.into();
        self
    }

    pub fn long_description(mut self, value: impl Into<String>) -> Self {
        self.info.long_description = value.into();
        self
    }

    pub fn release_notes(mut self, value: impl Into<String>) -> Self {
        self.info.release_notes = value.into();
        self
    }

    pub fn custom_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.custom_fields.push((key.into(), value.into()));
        self
    }

    /// Validates required fields and returns the finished manifest.
    pub fn build(self) -> Result<ManifestInfo, ManifestError> {
        if self.info.name.trim().is_empty() {
            return Err(ManifestError::MissingField("name"));
        }
        if self.info.target_app_name.trim().is_empty() {
            return Err(ManifestError::MissingField("targetAppName"));
        }
        Ok(self.info)
    }
}

/// Manifest payload errors (the `MalformedManifest` kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    InvalidJson(String),
    MissingField(&'static str),
    InvalidCustomField(String),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(detail) => write!(f, "manifest payload is not valid: {detail}"),
            Self::MissingField(name) => write!(f, "manifest missing required field: {name}"),
            Self::InvalidCustomField(name) => {
                write!(f, "manifest custom field must be a string: {name}")
            }
        }
    }
}

impl Error for ManifestError {}

#[cfg(test)]
mod tests {
    use super::{ManifestBuilder, ManifestError, ManifestInfo};

    const FULL_PAYLOAD: &str = r#"{
        "name": "Image Tools",
        "author": "sc",
        "version": "1.2",
        "targetAppName": "Viewer",
        "targetAppVersion": "2.0",
        "shortDescription": "Resize and crop",
        "longDescription": "Adds resize and crop actions.",
        "releaseNotes": "first release",
        "customFields": { "zeta": "last", "alpha": "first" }
    }"#;

    #[test]
    fn parses_full_payload() {
        let info = ManifestInfo::parse(FULL_PAYLOAD).expect("full payload parse");
        assert_eq!(info.name(), "Image Tools");
        assert_eq!(info.author(), "sc");
        assert_eq!(info.target_app_name(), "Viewer");
        assert_eq!(info.target_app_version(), Some("2.0"));
        assert_eq!(info.release_notes(), "first release");
        assert_eq!(info.custom_field("alpha"), Some("first"));
    }

    #[test]
    fn keeps_custom_field_document_order() {
        let info = ManifestInfo::parse(FULL_PAYLOAD).expect("full payload parse");
        let keys: Vec<&str> = info
            .custom_fields()
            .iter()
            .map(|(key, _)| key.as_str())
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn optional_fields_fall_back_to_empty() {
        let info = ManifestInfo::parse(r#"{"name":"Bare","targetAppName":"Viewer"}"#)
            .expect("minimal payload parse");
        assert_eq!(info.author(), "");
        assert_eq!(info.version(), "");
        assert!(info.target_app_version().is_none());
        assert!(info.custom_fields().is_empty());
    }

    #[test]
    fn rejects_missing_required_fields() {
        let err = ManifestInfo::parse(r#"{"targetAppName":"Viewer"}"#)
            .expect_err("missing name must fail");
        assert_eq!(err, ManifestError::MissingField("name"));

        let err = ManifestInfo::parse(r#"{"name":"X","targetAppName":"   "}"#)
            .expect_err("blank target app must fail");
        assert_eq!(err, ManifestError::MissingField("targetAppName"));
    }

    #[test]
    fn rejects_non_object_and_broken_payloads() {
        assert!(matches!(
            ManifestInfo::parse("[1, 2]"),
            Err(ManifestError::InvalidJson(_))
        ));
        assert!(matches!(
            ManifestInfo::parse("{\"name\": "),
            Err(ManifestError::InvalidJson(_))
        ));
    }

    #[test]
    fn rejects_non_string_custom_fields() {
        let err = ManifestInfo::parse(
            r#"{"name":"X","targetAppName":"Viewer","customFields":{"count":3}}"#,
        )
        .expect_err("numeric custom field must fail");
        assert_eq!(err, ManifestError::InvalidCustomField("count".to_string()));
    }

    #[test]
    fn to_json_is_accepted_by_parse() {
        let info = ManifestBuilder::new("Exporter", "Viewer")
            .version("0.3")
            .target_app_version("1.5")
            .custom_field("homepage", "https://example.invalid")
            .build()
            .expect("builder manifest");
        let reparsed = ManifestInfo::parse(&info.to_json()).expect("serialized payload parse");
        assert_eq!(reparsed, info);
    }
}
