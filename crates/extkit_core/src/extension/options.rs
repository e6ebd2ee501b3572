//! Discovery options supplied by the host.

use crate::extension::capability::is_valid_capability_id;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Parameters of one `ExtensionRegistry::load_from` pass.
///
/// Hosts usually hard-code these, but they may also ship them as JSON:
/// `{"capability": "viewer.extension", "appName": "Viewer", "minVersion": "2.0"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    /// Capability id a code unit must declare to be instantiated.
    pub capability: String,
    /// Required `targetAppName`; `None` disables the name check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Minimum numeric `targetAppVersion`; `None` disables the version check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

impl LoadOptions {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            app_name: None,
            min_version: None,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_min_version(mut self, min_version: impl Into<String>) -> Self {
        self.min_version = Some(min_version.into());
        self
    }

    /// Parses and validates options from JSON.
    pub fn from_json(payload: &str) -> Result<Self, LoadOptionsError> {
        let options: Self = serde_json::from_str(payload)
            .map_err(|err| LoadOptionsError::InvalidJson(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), LoadOptionsError> {
        if !is_valid_capability_id(&self.capability) {
            return Err(LoadOptionsError::InvalidCapability(self.capability.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOptionsError {
    InvalidJson(String),
    InvalidCapability(String),
}

impl Display for LoadOptionsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(detail) => write!(f, "load options are not valid JSON: {detail}"),
            Self::InvalidCapability(value) => write!(f, "capability id is invalid: {value}"),
        }
    }
}

impl Error for LoadOptionsError {}

#[cfg(test)]
mod tests {
    use super::{LoadOptions, LoadOptionsError};

    #[test]
    fn parses_camel_case_json() {
        let options = LoadOptions::from_json(
            r#"{"capability":"viewer.extension","appName":"Viewer","minVersion":"2.0"}"#,
        )
        .expect("options parse");
        assert_eq!(
            options,
            LoadOptions::new("viewer.extension")
                .with_app_name("Viewer")
                .with_min_version("2.0")
        );
    }

    #[test]
    fn optional_checks_default_to_disabled() {
        let options =
            LoadOptions::from_json(r#"{"capability":"viewer.extension"}"#).expect("options parse");
        assert!(options.app_name.is_none());
        assert!(options.min_version.is_none());
    }

    #[test]
    fn rejects_invalid_capability() {
        let err = LoadOptions::from_json(r#"{"capability":"Viewer Extension"}"#)
            .expect_err("invalid capability must fail");
        assert!(matches!(err, LoadOptionsError::InvalidCapability(_)));
    }

    #[test]
    fn serializes_without_unset_checks() {
        let json = serde_json::to_string(&LoadOptions::new("viewer.extension"))
            .expect("options serialize");
        assert_eq!(json, r#"{"capability":"viewer.extension"}"#);
    }
}
