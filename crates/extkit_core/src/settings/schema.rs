//! On-disk layout of the SQLite settings store.
//!
//! # Invariants
//! - The layout revision is mirrored to `PRAGMA user_version`; revision `n`
//!   is reached by running `UPGRADES[n - 1]`.
//! - A database written by a newer layout is refused, never downgraded.
//! - Connections handed to the store have every upgrade applied.

use super::{SettingsError, SettingsResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const CREATE_SETTINGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('bool', 'integer', 'text')),
    value TEXT NOT NULL
);";

const UPGRADES: &[&str] = &[CREATE_SETTINGS_TABLE];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings layout revision written by this build.
pub fn layout_version() -> u32 {
    UPGRADES.len() as u32
}

/// Opens `path` (creating it when missing) and upgrades its layout.
pub(crate) fn connect_file(path: &Path) -> SettingsResult<Connection> {
    prepare(Connection::open(path), "file")
}

pub(crate) fn connect_in_memory() -> SettingsResult<Connection> {
    prepare(Connection::open_in_memory(), "memory")
}

/// Layout revision recorded in an open settings database.
pub(crate) fn stored_version(conn: &Connection) -> SettingsResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn prepare(opened: rusqlite::Result<Connection>, mode: &str) -> SettingsResult<Connection> {
    let prepared = opened
        .map_err(SettingsError::from)
        .and_then(|mut conn| upgrade(&mut conn).map(|from| (conn, from)));
    match prepared {
        Ok((conn, from)) => {
            info!(
                "event=settings_open module=settings status=ok mode={} layout_from={} layout={}",
                mode,
                from,
                layout_version()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=settings_open module=settings status=error mode={} error={}",
                mode, err
            );
            Err(err)
        }
    }
}

/// Brings the layout up to [`layout_version`]; returns the revision found.
fn upgrade(conn: &mut Connection) -> SettingsResult<u32> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let found = stored_version(conn)?;
    let supported = layout_version();
    if found > supported {
        return Err(SettingsError::UnsupportedSchemaVersion { found, supported });
    }
    if found == supported {
        return Ok(found);
    }

    let tx = conn.transaction()?;
    for sql in &UPGRADES[found as usize..] {
        tx.execute_batch(sql)?;
    }
    tx.execute_batch(&format!("PRAGMA user_version = {supported};"))?;
    tx.commit()?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::{connect_in_memory, layout_version, stored_version, upgrade};
    use crate::settings::SettingsError;
    use rusqlite::Connection;

    #[test]
    fn fresh_database_is_upgraded_to_current_layout() {
        let conn = connect_in_memory().expect("in-memory settings db");
        assert_eq!(stored_version(&conn).expect("version"), layout_version());
        conn.execute(
            "INSERT INTO settings (key, kind, value) VALUES ('a', 'bool', 'true');",
            [],
        )
        .expect("settings table accepts rows");
    }

    #[test]
    fn upgrade_is_a_no_op_at_current_layout() {
        let mut conn = connect_in_memory().expect("in-memory settings db");
        assert_eq!(upgrade(&mut conn).expect("second upgrade"), layout_version());
    }

    #[test]
    fn unknown_row_kind_is_rejected_by_the_table() {
        let conn = connect_in_memory().expect("in-memory settings db");
        let inserted = conn.execute(
            "INSERT INTO settings (key, kind, value) VALUES ('a', 'float', '1.5');",
            [],
        );
        assert!(inserted.is_err());
    }

    #[test]
    fn newer_layout_is_refused() {
        let mut conn = Connection::open_in_memory().expect("raw in-memory db");
        conn.execute_batch("PRAGMA user_version = 7;")
            .expect("bump user_version");

        let err = upgrade(&mut conn).expect_err("newer layout must be refused");
        assert!(matches!(
            err,
            SettingsError::UnsupportedSchemaVersion { found: 7, supported } if supported == layout_version()
        ));
    }
}
