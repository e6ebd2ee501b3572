//! In-process settings store without backing storage.

use super::{ConfigProperty, SettingValue, SettingsResult, SettingsStore, SettingsTable};
use std::collections::BTreeMap;

/// Settings store that lives only in memory.
///
/// `load`/`save` never fail; they only count invocations so hosts can observe
/// checkpoint traffic.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    table: SettingsTable,
    load_count: usize,
    save_count: usize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated as if `values` had been persisted earlier.
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, SettingValue)>,
        K: Into<String>,
    {
        let mut store = Self::new();
        let values: BTreeMap<String, SettingValue> = values
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        store.table.replace_values(values);
        store
    }

    pub fn load_count(&self) -> usize {
        self.load_count
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    /// Registered properties in registration order.
    pub fn properties(&self) -> &[ConfigProperty] {
        self.table.properties()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&mut self) -> SettingsResult<()> {
        self.load_count += 1;
        Ok(())
    }

    fn save(&mut self) -> SettingsResult<()> {
        self.save_count += 1;
        Ok(())
    }

    fn value(&self, key: &str) -> Option<SettingValue> {
        self.table.value(key)
    }

    fn set_value(&mut self, key: &str, value: SettingValue) {
        self.table.set_value(key, value);
    }

    fn register_property(&mut self, property: ConfigProperty) {
        self.table.register_property(property);
    }

    fn property(&self, key: &str) -> Option<&ConfigProperty> {
        self.table.property(key)
    }

    fn set_property_enabled(&mut self, key: &str, enabled: bool) -> bool {
        self.table.set_property_enabled(key, enabled)
    }
}
