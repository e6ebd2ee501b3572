//! Host settings store contracts and reference implementations.
//!
//! # Responsibility
//! - Define the narrow key/value interface the reconciliation bridge consumes.
//! - Model configuration entries (`ConfigProperty`) contributed by extensions.
//! - Provide in-memory and SQLite-backed stores.
//!
//! # Invariants
//! - A property's visibility flag is independent of its value.
//! - Registering a property with an existing key replaces it in place
//!   (later registrations shadow earlier ones).

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;
mod schema;
pub mod sqlite;

pub use memory::MemorySettingsStore;
pub use schema::layout_version;
pub use sqlite::SqliteSettingsStore;

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Typed persisted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Stable kind tag used by persistent stores.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
        }
    }

    /// Text form paired with `kind()` for persistence.
    pub fn encode(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    /// Inverse of `kind()` + `encode()`.
    pub fn decode(kind: &str, raw: &str) -> SettingsResult<Self> {
        match kind {
            "bool" => match raw {
                "true" => Ok(Self::Bool(true)),
                "false" => Ok(Self::Bool(false)),
                other => Err(SettingsError::InvalidValue(format!(
                    "expected bool, got `{other}`"
                ))),
            },
            "integer" => raw.parse::<i64>().map(Self::Integer).map_err(|err| {
                SettingsError::InvalidValue(format!("expected integer, got `{raw}`: {err}"))
            }),
            "text" => Ok(Self::Text(raw.to_string())),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown value kind `{other}`"
            ))),
        }
    }
}

/// One named configuration entry with an independent visibility flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigProperty {
    key: String,
    label: String,
    default_value: SettingValue,
    enabled: bool,
}

impl ConfigProperty {
    /// Creates an enabled property. `key` must be fully qualified, e.g.
    /// `Image Tools.General.thumbnailSize`.
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        default_value: SettingValue,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            default_value,
            enabled: true,
        }
    }

    pub fn boolean(key: impl Into<String>, label: impl Into<String>, default_value: bool) -> Self {
        Self::new(key, label, SettingValue::Bool(default_value))
    }

    pub fn integer(key: impl Into<String>, label: impl Into<String>, default_value: i64) -> Self {
        Self::new(key, label, SettingValue::Integer(default_value))
    }

    pub fn text(
        key: impl Into<String>,
        label: impl Into<String>,
        default_value: impl Into<String>,
    ) -> Self {
        Self::new(key, label, SettingValue::Text(default_value.into()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn default_value(&self) -> &SettingValue {
        &self.default_value
    }

    /// Whether the entry is visible/editable in configuration UIs.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Generic persisted key/value store owned by the host.
pub trait SettingsStore {
    /// Reloads persisted values from backing storage.
    fn load(&mut self) -> SettingsResult<()>;
    /// Persists all current values.
    fn save(&mut self) -> SettingsResult<()>;

    /// Current value for `key`: an explicitly set/loaded value, else the
    /// default of a registered property with that key.
    fn value(&self, key: &str) -> Option<SettingValue>;
    fn set_value(&mut self, key: &str, value: SettingValue);

    fn register_property(&mut self, property: ConfigProperty);
    fn property(&self, key: &str) -> Option<&ConfigProperty>;
    /// Sets the visibility flag of a registered property; returns `false`
    /// when no property is registered under `key`.
    fn set_property_enabled(&mut self, key: &str, enabled: bool) -> bool;

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.value(key)
            .and_then(|value| value.as_bool())
            .unwrap_or(default)
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.set_value(key, SettingValue::Bool(value));
    }
}

/// Shared in-memory table behind both reference stores.
#[derive(Debug, Default)]
pub(crate) struct SettingsTable {
    values: BTreeMap<String, SettingValue>,
    properties: Vec<ConfigProperty>,
}

impl SettingsTable {
    pub(crate) fn value(&self, key: &str) -> Option<SettingValue> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        self.property(key)
            .map(|property| property.default_value().clone())
    }

    pub(crate) fn set_value(&mut self, key: &str, value: SettingValue) {
        self.values.insert(key.to_string(), value);
    }

    pub(crate) fn replace_values(&mut self, values: BTreeMap<String, SettingValue>) {
        self.values = values;
    }

    pub(crate) fn register_property(&mut self, property: ConfigProperty) {
        match self
            .properties
            .iter_mut()
            .find(|existing| existing.key() == property.key())
        {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub(crate) fn property(&self, key: &str) -> Option<&ConfigProperty> {
        self.properties.iter().find(|property| property.key() == key)
    }

    pub(crate) fn properties(&self) -> &[ConfigProperty] {
        &self.properties
    }

    pub(crate) fn set_property_enabled(&mut self, key: &str, enabled: bool) -> bool {
        match self
            .properties
            .iter_mut()
            .find(|property| property.key() == key)
        {
            Some(property) => {
                property.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Effective values to persist: explicit values plus defaults of
    /// registered properties that were never set.
    pub(crate) fn snapshot(&self) -> BTreeMap<String, SettingValue> {
        let mut snapshot = self.values.clone();
        for property in &self.properties {
            snapshot
                .entry(property.key().to_string())
                .or_insert_with(|| property.default_value().clone());
        }
        snapshot
    }
}

/// Settings persistence errors.
#[derive(Debug)]
pub enum SettingsError {
    Sqlite(rusqlite::Error),
    /// The database was written by a newer settings layout.
    UnsupportedSchemaVersion { found: u32, supported: u32 },
    InvalidValue(String),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion { found, supported } => write!(
                f,
                "settings layout version {found} is newer than supported {supported}"
            ),
            Self::InvalidValue(message) => write!(f, "invalid persisted setting: {message}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::InvalidValue(_) => None,
        }
    }
}

impl From<rusqlite::Error> for SettingsError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigProperty, SettingValue, SettingsError, SettingsTable};

    #[test]
    fn setting_values_encode_and_decode_by_kind() {
        for value in [
            SettingValue::Bool(false),
            SettingValue::Integer(-42),
            SettingValue::Text("a b c".to_string()),
        ] {
            let decoded =
                SettingValue::decode(value.kind(), &value.encode()).expect("decode encoded value");
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn decode_rejects_unknown_kind_and_bad_payloads() {
        assert!(matches!(
            SettingValue::decode("float", "1.0"),
            Err(SettingsError::InvalidValue(_))
        ));
        assert!(matches!(
            SettingValue::decode("bool", "yes"),
            Err(SettingsError::InvalidValue(_))
        ));
        assert!(matches!(
            SettingValue::decode("integer", "12x"),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn table_value_falls_back_to_property_default() {
        let mut table = SettingsTable::default();
        table.register_property(ConfigProperty::integer("a.size", "Size", 7));
        assert_eq!(table.value("a.size"), Some(SettingValue::Integer(7)));

        table.set_value("a.size", SettingValue::Integer(9));
        assert_eq!(table.value("a.size"), Some(SettingValue::Integer(9)));
        assert_eq!(table.value("missing"), None);
    }

    #[test]
    fn later_registration_shadows_same_key() {
        let mut table = SettingsTable::default();
        table.register_property(ConfigProperty::text("shared.key", "First", "one"));
        table.register_property(ConfigProperty::text("shared.key", "Second", "two"));

        assert_eq!(table.properties().len(), 1);
        let property = table.property("shared.key").expect("registered property");
        assert_eq!(property.label(), "Second");
    }

    #[test]
    fn snapshot_includes_unset_property_defaults() {
        let mut table = SettingsTable::default();
        table.register_property(ConfigProperty::boolean("a.flag", "Flag", true));
        table.set_value("extension.enabled.x", SettingValue::Bool(false));

        let snapshot = table.snapshot();
        assert_eq!(snapshot.get("a.flag"), Some(&SettingValue::Bool(true)));
        assert_eq!(
            snapshot.get("extension.enabled.x"),
            Some(&SettingValue::Bool(false))
        );
    }

    #[test]
    fn visibility_toggle_reports_unknown_keys() {
        let mut table = SettingsTable::default();
        table.register_property(ConfigProperty::boolean("a.flag", "Flag", true));

        assert!(table.set_property_enabled("a.flag", false));
        assert!(!table.property("a.flag").expect("property").is_enabled());
        assert!(!table.set_property_enabled("b.flag", false));
    }
}
