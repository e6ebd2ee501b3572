//! Two-directional sync between the extension registry and a settings store.
//!
//! # Responsibility
//! - Pull persisted enabled flags into the registry at load checkpoints.
//! - Push live registry state into the store before save and presentation.
//! - Heal drift whenever a caller queries an extension's enabled state.
//! - Mirror each extension's enabled flag onto the visibility of the
//!   configuration entries it owns.
//!
//! # Invariants
//! - The persisted key of an identity is `extension.enabled.<identity>`.
//! - After `load()` returns (even with `Err`) every loaded identity's registry
//!   flag equals its persisted value (default `true`).
//! - After `push_to_store()` every loaded identity's persisted value equals
//!   the registry flag.
//! - Mutations made independently on both sides between checkpoints are not
//!   merged: whichever side the next checkpoint treats as source wins.

use crate::settings::{ConfigProperty, SettingsResult, SettingsStore};
use log::{info, warn};

/// Persisted-key prefix of per-extension enabled flags.
pub const ENABLED_KEY_PREFIX: &str = "extension.enabled.";

/// Registry operations the bridge depends on.
pub trait ExtensionCatalog {
    /// Loaded identities in the catalog's enumeration order.
    fn loaded_identities(&self) -> Vec<String>;

    /// `false` for unknown identities.
    fn is_extension_enabled(&self, identity: &str) -> bool;

    /// Returns `true` only on a real transition.
    fn set_extension_enabled(&mut self, identity: &str, enabled: bool, notify: bool) -> bool;

    /// Configuration entries owned by `identity`; empty when unknown.
    fn configuration_entries_of(&self, identity: &str) -> Vec<ConfigProperty>;
}

/// Persisted key holding the enabled flag of `identity`.
pub fn enabled_key(identity: &str) -> String {
    format!("{ENABLED_KEY_PREFIX}{identity}")
}

/// Couples a catalog and a store for the duration of a checkpoint.
pub struct ReconciliationBridge<'a, C: ?Sized, S: ?Sized> {
    catalog: &'a mut C,
    store: &'a mut S,
}

impl<'a, C, S> ReconciliationBridge<'a, C, S>
where
    C: ExtensionCatalog + ?Sized,
    S: SettingsStore + ?Sized,
{
    pub fn new(catalog: &'a mut C, store: &'a mut S) -> Self {
        Self { catalog, store }
    }

    pub fn catalog(&self) -> &C {
        self.catalog
    }

    pub fn store(&self) -> &S {
        self.store
    }

    /// Registers every configuration entry of every loaded extension, enabled
    /// or not, so the store loads and saves their values.
    ///
    /// Returns the number of entries registered.
    pub fn register_extension_properties(&mut self) -> usize {
        let mut registered = 0;
        for identity in self.catalog.loaded_identities() {
            for property in self.catalog.configuration_entries_of(&identity) {
                self.store.register_property(property);
                registered += 1;
            }
        }
        info!(
            "event=reconcile_register module=reconcile status=ok properties={}",
            registered
        );
        registered
    }

    /// Load checkpoint: reloads the store, then pulls it into the catalog.
    ///
    /// # Errors
    /// - Returns the store's load error. The pull has still run against the
    ///   store's current contents.
    pub fn load(&mut self) -> SettingsResult<()> {
        let loaded = self.store.load();
        if let Err(err) = &loaded {
            warn!(
                "event=reconcile_load module=reconcile status=error error={}",
                err
            );
        }
        self.pull_from_store();
        loaded
    }

    /// Store is the source of truth: applies persisted flags silently.
    pub fn pull_from_store(&mut self) {
        let mut changed = 0;
        let identities = self.catalog.loaded_identities();
        for identity in &identities {
            let enabled = self.store.get_bool(&enabled_key(identity), true);
            if self.catalog.set_extension_enabled(identity, enabled, false) {
                changed += 1;
            }
            self.refresh_visibility(identity, enabled);
        }
        info!(
            "event=reconcile_pull module=reconcile status=ok extensions={} changed={}",
            identities.len(),
            changed
        );
    }

    /// Query with a healing side effect; see [`Self::heal_on_query`].
    pub fn is_enabled(&mut self, identity: &str, default: bool) -> bool {
        self.heal_on_query(identity, default)
    }

    /// Returns the effective enabled state of `identity`.
    ///
    /// The catalog's live flag is authoritative and is written back when the
    /// persisted value differs. Unknown identities report `false`, so a stale
    /// `true` for an extension that is not loaded is healed to `false`.
    pub fn heal_on_query(&mut self, identity: &str, default: bool) -> bool {
        let key = enabled_key(identity);
        let persisted = self.store.get_bool(&key, default);
        let live = self.catalog.is_extension_enabled(identity);
        if live != persisted {
            info!(
                "event=reconcile_heal module=reconcile status=ok identity={} persisted={} live={}",
                identity, persisted, live
            );
            self.store.set_bool(&key, live);
        }
        live
    }

    /// Persists `enabled` and forwards it to the catalog with notification.
    ///
    /// Returns whether the catalog performed a transition.
    pub fn set_enabled(&mut self, identity: &str, enabled: bool) -> bool {
        self.store.set_bool(&enabled_key(identity), enabled);
        let changed = self.catalog.set_extension_enabled(identity, enabled, true);
        self.refresh_visibility(identity, enabled);
        changed
    }

    /// Registry is the source of truth: writes every live flag to the store.
    pub fn push_to_store(&mut self) {
        let identities = self.catalog.loaded_identities();
        for identity in &identities {
            let enabled = self.heal_on_query(identity, false);
            self.refresh_visibility(identity, enabled);
        }
        info!(
            "event=reconcile_push module=reconcile status=ok extensions={}",
            identities.len()
        );
    }

    /// Save checkpoint: pushes live state, then persists the store.
    pub fn save(&mut self) -> SettingsResult<()> {
        self.push_to_store();
        self.store.save().inspect_err(|err| {
            warn!(
                "event=reconcile_save module=reconcile status=error error={}",
                err
            );
        })
    }

    /// Presentation checkpoint, run before the configuration UI is shown.
    pub fn prepare_presentation(&mut self) {
        self.push_to_store();
    }

    fn refresh_visibility(&mut self, identity: &str, enabled: bool) {
        for property in self.catalog.configuration_entries_of(identity) {
            self.store.set_property_enabled(property.key(), enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{enabled_key, ExtensionCatalog, ReconciliationBridge};
    use crate::settings::{
        ConfigProperty, MemorySettingsStore, SettingValue, SettingsError, SettingsResult,
        SettingsStore,
    };
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeCatalog {
        enabled: BTreeMap<String, bool>,
        properties: BTreeMap<String, Vec<ConfigProperty>>,
        notified: Vec<(String, bool)>,
    }

    impl FakeCatalog {
        fn with(identities: &[(&str, bool)]) -> Self {
            let mut catalog = Self::default();
            for (identity, enabled) in identities {
                catalog.enabled.insert(identity.to_string(), *enabled);
            }
            catalog
        }
    }

    impl ExtensionCatalog for FakeCatalog {
        fn loaded_identities(&self) -> Vec<String> {
            self.enabled.keys().cloned().collect()
        }

        fn is_extension_enabled(&self, identity: &str) -> bool {
            self.enabled.get(identity).copied().unwrap_or(false)
        }

        fn set_extension_enabled(&mut self, identity: &str, enabled: bool, notify: bool) -> bool {
            match self.enabled.get_mut(identity) {
                Some(current) if *current != enabled => {
                    *current = enabled;
                    if notify {
                        self.notified.push((identity.to_string(), enabled));
                    }
                    true
                }
                _ => false,
            }
        }

        fn configuration_entries_of(&self, identity: &str) -> Vec<ConfigProperty> {
            self.properties.get(identity).cloned().unwrap_or_default()
        }
    }

    struct FailingLoadStore {
        inner: MemorySettingsStore,
    }

    impl SettingsStore for FailingLoadStore {
        fn load(&mut self) -> SettingsResult<()> {
            Err(SettingsError::UnsupportedSchemaVersion {
                found: 99,
                supported: 1,
            })
        }

        fn save(&mut self) -> SettingsResult<()> {
            self.inner.save()
        }

        fn value(&self, key: &str) -> Option<SettingValue> {
            self.inner.value(key)
        }

        fn set_value(&mut self, key: &str, value: SettingValue) {
            self.inner.set_value(key, value);
        }

        fn register_property(&mut self, property: ConfigProperty) {
            self.inner.register_property(property);
        }

        fn property(&self, key: &str) -> Option<&ConfigProperty> {
            self.inner.property(key)
        }

        fn set_property_enabled(&mut self, key: &str, enabled: bool) -> bool {
            self.inner.set_property_enabled(key, enabled)
        }
    }

    #[test]
    fn enabled_key_uses_prefix() {
        assert_eq!(enabled_key("ext.viewer"), "extension.enabled.ext.viewer");
    }

    #[test]
    fn load_applies_persisted_flags_silently() {
        let mut catalog = FakeCatalog::with(&[("a", true), ("b", true)]);
        let mut store =
            MemorySettingsStore::with_values([(enabled_key("a"), SettingValue::Bool(false))]);

        ReconciliationBridge::new(&mut catalog, &mut store)
            .load()
            .expect("memory load");

        assert!(!catalog.is_extension_enabled("a"));
        assert!(catalog.is_extension_enabled("b"));
        assert!(catalog.notified.is_empty());
        assert_eq!(store.load_count(), 1);
    }

    #[test]
    fn load_failure_is_reported_after_pull() {
        let mut catalog = FakeCatalog::with(&[("a", true)]);
        let mut store = FailingLoadStore {
            inner: MemorySettingsStore::with_values([(
                enabled_key("a"),
                SettingValue::Bool(false),
            )]),
        };

        let err = ReconciliationBridge::new(&mut catalog, &mut store)
            .load()
            .expect_err("store load failure must surface");
        assert!(matches!(
            err,
            SettingsError::UnsupportedSchemaVersion { found: 99, .. }
        ));
        assert!(!catalog.is_extension_enabled("a"));
    }

    #[test]
    fn query_heals_stale_persisted_value() {
        let mut catalog = FakeCatalog::with(&[("a", false)]);
        let mut store =
            MemorySettingsStore::with_values([(enabled_key("a"), SettingValue::Bool(true))]);

        let enabled = ReconciliationBridge::new(&mut catalog, &mut store).is_enabled("a", true);

        assert!(!enabled);
        assert!(!store.get_bool(&enabled_key("a"), true));
    }

    #[test]
    fn query_for_unknown_identity_heals_to_disabled() {
        let mut catalog = FakeCatalog::default();
        let mut store = MemorySettingsStore::new();
        store.set_bool(&enabled_key("ghost"), true);

        let mut bridge = ReconciliationBridge::new(&mut catalog, &mut store);
        assert!(!bridge.is_enabled("ghost", true));
        assert!(!store.get_bool(&enabled_key("ghost"), true));
    }

    #[test]
    fn query_for_unknown_identity_without_value_persists_disabled() {
        let mut catalog = FakeCatalog::default();
        let mut store = MemorySettingsStore::new();

        assert!(!ReconciliationBridge::new(&mut catalog, &mut store).is_enabled("ghost", false));
        assert!(store.value(&enabled_key("ghost")).is_none());

        assert!(!ReconciliationBridge::new(&mut catalog, &mut store).is_enabled("ghost", true));
        assert_eq!(
            store.value(&enabled_key("ghost")),
            Some(SettingValue::Bool(false))
        );
    }

    #[test]
    fn set_enabled_writes_store_and_notifies_catalog() {
        let mut catalog = FakeCatalog::with(&[("a", true)]);
        let mut store = MemorySettingsStore::new();

        let mut bridge = ReconciliationBridge::new(&mut catalog, &mut store);
        assert!(bridge.set_enabled("a", false));
        assert!(!bridge.set_enabled("a", false));

        assert!(!store.get_bool(&enabled_key("a"), true));
        assert_eq!(catalog.notified, vec![("a".to_string(), false)]);
    }

    #[test]
    fn save_pushes_registry_state_then_persists() {
        let mut catalog = FakeCatalog::with(&[("a", true), ("b", false)]);
        let mut store =
            MemorySettingsStore::with_values([(enabled_key("b"), SettingValue::Bool(true))]);

        ReconciliationBridge::new(&mut catalog, &mut store)
            .save()
            .expect("memory save");

        assert!(store.get_bool(&enabled_key("a"), false));
        assert!(!store.get_bool(&enabled_key("b"), true));
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn property_visibility_follows_extension_flag() {
        let mut catalog = FakeCatalog::with(&[("a", true)]);
        catalog.properties.insert(
            "a".to_string(),
            vec![ConfigProperty::integer("A.General.size", "Size", 4)],
        );
        let mut store =
            MemorySettingsStore::with_values([(enabled_key("a"), SettingValue::Bool(false))]);

        let mut bridge = ReconciliationBridge::new(&mut catalog, &mut store);
        assert_eq!(bridge.register_extension_properties(), 1);
        bridge.load().expect("memory load");
        assert!(!bridge
            .store()
            .property("A.General.size")
            .expect("registered property")
            .is_enabled());

        bridge.set_enabled("a", true);
        bridge.prepare_presentation();
        assert!(bridge
            .store()
            .property("A.General.size")
            .expect("registered property")
            .is_enabled());
        assert_eq!(
            bridge.store().value("A.General.size"),
            Some(SettingValue::Integer(4))
        );
    }
}
