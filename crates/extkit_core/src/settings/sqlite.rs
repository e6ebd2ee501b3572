//! SQLite-backed settings store.
//!
//! # Responsibility
//! - Persist typed key/value settings in the `settings` table.
//! - Keep the working copy in memory between `load` and `save`.
//!
//! # Invariants
//! - `load` rejects rows with an unknown kind or malformed payload instead of
//!   silently dropping them; the working copy is left untouched on failure.
//! - `save` writes every effective value in a single transaction.

use super::{ConfigProperty, SettingValue, SettingsResult, SettingsStore, SettingsTable};
use super::schema;
use log::{error, info};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;

/// Settings store persisted to a SQLite database.
pub struct SqliteSettingsStore {
    conn: Connection,
    table: SettingsTable,
}

impl SqliteSettingsStore {
    /// Opens (or creates) the settings database at `path`.
    ///
    /// Values are not read until `load` is called.
    pub fn open(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let conn = schema::connect_file(path.as_ref())?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> SettingsResult<Self> {
        let conn = schema::connect_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            table: SettingsTable::default(),
        }
    }

    /// Layout revision recorded in the open database.
    pub fn schema_version(&self) -> SettingsResult<u32> {
        schema::stored_version(&self.conn)
    }

    /// Registered properties in registration order.
    pub fn properties(&self) -> &[ConfigProperty] {
        self.table.properties()
    }

    fn read_rows(&self) -> SettingsResult<BTreeMap<String, SettingValue>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, kind, value FROM settings ORDER BY key;")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut values = BTreeMap::new();
        for row in rows {
            let (key, kind, raw) = row?;
            let value = SettingValue::decode(&kind, &raw)?;
            values.insert(key, value);
        }
        Ok(values)
    }

    fn write_rows(&mut self, values: &BTreeMap<String, SettingValue>) -> SettingsResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO settings (key, kind, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET kind = excluded.kind, value = excluded.value;",
            )?;
            for (key, value) in values {
                stmt.execute(params![key, value.kind(), value.encode()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn load(&mut self) -> SettingsResult<()> {
        match self.read_rows() {
            Ok(values) => {
                info!(
                    "event=settings_load module=settings status=ok count={}",
                    values.len()
                );
                self.table.replace_values(values);
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=settings_load module=settings status=error error={}",
                    err
                );
                Err(err)
            }
        }
    }

    fn save(&mut self) -> SettingsResult<()> {
        let snapshot = self.table.snapshot();
        match self.write_rows(&snapshot) {
            Ok(()) => {
                info!(
                    "event=settings_save module=settings status=ok count={}",
                    snapshot.len()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=settings_save module=settings status=error error={}",
                    err
                );
                Err(err)
            }
        }
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
