//! SQLite schema and migrations for the state store.

use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sync_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    primary_calendar_id TEXT NOT NULL,
    secondary_calendar_id TEXT NOT NULL,
    primary_key TEXT NOT NULL,
    secondary_key TEXT NOT NULL,
    primary_hash TEXT NOT NULL,
    secondary_hash TEXT NOT NULL,
    authority TEXT NOT NULL CHECK (authority IN ('primary', 'secondary')),
    created_at TEXT NOT NULL,
    last_synced_at TEXT NOT NULL,
    UNIQUE (primary_calendar_id, secondary_calendar_id, primary_key)
);

CREATE INDEX IF NOT EXISTS idx_sync_records_pair
    ON sync_records (primary_calendar_id, secondary_calendar_id);

CREATE INDEX IF NOT EXISTS idx_sync_records_secondary_key
    ON sync_records (primary_calendar_id, secondary_calendar_id, secondary_key);
"#;

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_V1_SQL)];

pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply pending migrations in ascending order, one transaction each.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        assert_eq!(current_schema_version(&conn)?, 0);

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        // Second run is a no-op
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);

        let has_table: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sync_records')",
            [],
            |row| row.get(0),
        )?;
        assert!(has_table);
        Ok(())
    }
}
