//! Persistent mapping between source events and their mirrors.
//!
//! Every record is scoped by [`PairId`], so one database can serve several
//! calendar pairs. Each mutation commits on its own; nothing is batched across
//! a pass.

mod record;
pub mod schema;

pub use record::{Authority, MigrateResult, MigrateScope, PairId, PairStatus, SyncRecord};

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use tracing::debug;

use crate::error::SyncResult;

/// Busy timeout for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str = "primary_calendar_id, secondary_calendar_id, primary_key, secondary_key, \
     primary_hash, secondary_hash, authority, created_at, last_synced_at";

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (or create) the store at `path` and bring its schema up to date.
    pub fn open(path: &Path) -> SyncResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened state store");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> SyncResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> SyncResult<Self> {
        configure_connection(&conn)?;
        schema::migrate(&mut conn)?;
        Ok(StateStore { conn })
    }

    /// Insert or update the record keyed by `(pair, primary_key)`.
    ///
    /// An existing row keeps its `created_at` and `authority`.
    pub fn upsert(&self, record: &SyncRecord) -> SyncResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO sync_records ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (primary_calendar_id, secondary_calendar_id, primary_key) DO UPDATE SET
                     secondary_key = excluded.secondary_key,
                     primary_hash = excluded.primary_hash,
                     secondary_hash = excluded.secondary_hash,
                     last_synced_at = excluded.last_synced_at"
            ),
            params![
                record.pair.primary,
                record.pair.secondary,
                record.primary_key,
                record.secondary_key,
                record.primary_hash,
                record.secondary_hash,
                record.authority.as_str(),
                format_timestamp(&record.created_at),
                format_timestamp(&record.last_synced_at),
            ],
        )?;
        Ok(())
    }

    /// Swap the record stored under `old_primary_key` for `record` in one transaction.
    pub fn replace(&mut self, old_primary_key: &str, record: &SyncRecord) -> SyncResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM sync_records
             WHERE primary_calendar_id = ?1 AND secondary_calendar_id = ?2 AND primary_key = ?3",
            params![record.pair.primary, record.pair.secondary, old_primary_key],
        )?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO sync_records ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                record.pair.primary,
                record.pair.secondary,
                record.primary_key,
                record.secondary_key,
                record.primary_hash,
                record.secondary_hash,
                record.authority.as_str(),
                format_timestamp(&record.created_at),
                format_timestamp(&record.last_synced_at),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn find_by_primary_key(&self, pair: &PairId, primary_key: &str) -> SyncResult<Option<SyncRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sync_records
                     WHERE primary_calendar_id = ?1 AND secondary_calendar_id = ?2 AND primary_key = ?3"
                ),
                params![pair.primary, pair.secondary, primary_key],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn find_by_secondary_key(
        &self,
        pair: &PairId,
        secondary_key: &str,
    ) -> SyncResult<Option<SyncRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sync_records
                     WHERE primary_calendar_id = ?1 AND secondary_calendar_id = ?2 AND secondary_key = ?3"
                ),
                params![pair.primary, pair.secondary, secondary_key],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All records of one pair, ordered by primary key.
    pub fn list_for_pair(&self, pair: &PairId) -> SyncResult<Vec<SyncRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM sync_records
             WHERE primary_calendar_id = ?1 AND secondary_calendar_id = ?2
             ORDER BY primary_key"
        ))?;
        let records = stmt
            .query_map(params![pair.primary, pair.secondary], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Delete one record. Returns whether a row was removed.
    pub fn delete(&self, pair: &PairId, primary_key: &str) -> SyncResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM sync_records
             WHERE primary_calendar_id = ?1 AND secondary_calendar_id = ?2 AND primary_key = ?3",
            params![pair.primary, pair.secondary, primary_key],
        )?;
        Ok(removed > 0)
    }

    /// Delete every record of one pair.
    pub fn clear_pair(&self, pair: &PairId) -> SyncResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM sync_records WHERE primary_calendar_id = ?1 AND secondary_calendar_id = ?2",
            params![pair.primary, pair.secondary],
        )?;
        Ok(removed)
    }

    /// Every pair with at least one record.
    pub fn pair_ids(&self) -> SyncResult<Vec<PairId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT primary_calendar_id, secondary_calendar_id FROM sync_records
             ORDER BY primary_calendar_id, secondary_calendar_id",
        )?;
        let pairs = stmt
            .query_map([], |row| Ok(PairId::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Every calendar id referenced on either side.
    pub fn calendar_ids(&self) -> SyncResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT primary_calendar_id FROM sync_records
             UNION
             SELECT secondary_calendar_id FROM sync_records
             ORDER BY 1",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Record counts per authority and the most recent sync time for one pair.
    pub fn status(&self, pair: &PairId) -> SyncResult<PairStatus> {
        let mut stmt = self.conn.prepare(
            "SELECT authority, COUNT(*), MAX(last_synced_at) FROM sync_records
             WHERE primary_calendar_id = ?1 AND secondary_calendar_id = ?2
             GROUP BY authority",
        )?;
        let rows = stmt
            .query_map(params![pair.primary, pair.secondary], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut status = PairStatus {
            pair: pair.clone(),
            primary_authority: 0,
            secondary_authority: 0,
            last_synced_at: None,
        };

        for (authority, count, last) in rows {
            let count = usize::try_from(count).unwrap_or_default();
            match authority.parse::<Authority>() {
                Ok(Authority::Primary) => status.primary_authority = count,
                Ok(Authority::Secondary) => status.secondary_authority = count,
                Err(_) => continue,
            }
            let last = last.as_deref().and_then(|s| parse_timestamp(s).ok());
            status.last_synced_at = status.last_synced_at.max(last);
        }

        Ok(status)
    }

    /// Point every record that references `old_id` at `new_id` instead.
    ///
    /// Rows already filed under `new_id` with the same key are replaced.
    /// With `dry_run` only the affected rows are counted.
    pub fn migrate_calendar_id(
        &mut self,
        old_id: &str,
        new_id: &str,
        scope: MigrateScope,
        dry_run: bool,
    ) -> SyncResult<MigrateResult> {
        let mut result = MigrateResult {
            dry_run,
            ..MigrateResult::default()
        };

        let tx = self.conn.transaction()?;
        for (column, include) in [
            ("primary_calendar_id", scope.includes_primary()),
            ("secondary_calendar_id", scope.includes_secondary()),
        ] {
            if !include {
                continue;
            }

            let affected = if dry_run {
                let count: i64 = tx.query_row(
                    &format!("SELECT COUNT(*) FROM sync_records WHERE {column} = ?1"),
                    params![old_id],
                    |row| row.get(0),
                )?;
                usize::try_from(count).unwrap_or_default()
            } else {
                tx.execute(
                    &format!("UPDATE OR REPLACE sync_records SET {column} = ?2 WHERE {column} = ?1"),
                    params![old_id, new_id],
                )?
            };

            if column == "primary_calendar_id" {
                result.primary_rows = affected;
            } else {
                result.secondary_rows = affected;
            }
        }
        tx.commit()?;

        Ok(result)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    let authority: String = row.get(6)?;
    let authority = authority.parse::<Authority>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into())
    })?;

    Ok(SyncRecord {
        pair: PairId::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
        primary_key: row.get(2)?,
        secondary_key: row.get(3)?,
        primary_hash: row.get(4)?,
        secondary_hash: row.get(5)?,
        authority,
        created_at: timestamp_column(row, 7)?,
        last_synced_at: timestamp_column(row, 8)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKey, RecurrenceKey};

    fn record(pair: &PairId, source: &str, mirror: &str, authority: Authority) -> SyncRecord {
        SyncRecord::new(
            pair.clone(),
            authority,
            &EventKey::parse(source),
            &EventKey::parse(mirror),
            format!("hash-{}", source),
            format!("hash-{}", mirror),
        )
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("state.db");

        let store = StateStore::open(&path).expect("open store");
        assert!(path.exists());

        let version = schema::current_schema_version(&store.conn).expect("schema version");
        assert_eq!(version, schema::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn test_upsert_over_stale_record_keeps_created_at() {
        let store = StateStore::open_in_memory().expect("open store");
        let pair = PairId::new("work", "personal");

        let mut first = record(&pair, "A", "m-1", Authority::Primary);
        first.created_at = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        store.upsert(&first).expect("first upsert");

        let second = record(&pair, "A", "m-2", Authority::Primary);
        store.upsert(&second).expect("upsert over existing row must not fail");

        let stored = store
            .find_by_primary_key(&pair, "A")
            .expect("query")
            .expect("record exists");
        assert_eq!(stored.secondary_key, "m-2");
        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(store.list_for_pair(&pair).expect("list").len(), 1);
    }

    #[test]
    fn test_master_and_override_are_distinct_records() {
        let store = StateStore::open_in_memory().expect("open store");
        let pair = PairId::new("work", "personal");

        let master = EventKey::new("X", None);
        let over = EventKey::new("X", Some(RecurrenceKey::new("20260101")));
        for (key, mirror) in [(&master, "m-1"), (&over, "m-2")] {
            store
                .upsert(&record(&pair, &key.to_string(), mirror, Authority::Primary))
                .expect("upsert");
        }

        let records = store.list_for_pair(&pair).expect("list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_key(), master);
        assert_eq!(records[1].source_key(), over);
    }

    #[test]
    fn test_pairs_do_not_cross_talk() {
        let store = StateStore::open_in_memory().expect("open store");
        let a = PairId::new("work", "personal");
        let b = PairId::new("work", "family");

        store.upsert(&record(&a, "E1", "m-1", Authority::Primary)).expect("upsert");
        store.upsert(&record(&b, "E1", "m-9", Authority::Primary)).expect("upsert");
        store.upsert(&record(&b, "E2", "m-8", Authority::Primary)).expect("upsert");

        assert_eq!(store.list_for_pair(&a).expect("list").len(), 1);
        assert_eq!(store.clear_pair(&b).expect("clear"), 2);
        assert_eq!(store.list_for_pair(&a).expect("list").len(), 1);
        assert_eq!(store.pair_ids().expect("pairs"), vec![a.clone()]);
        assert!(store.delete(&a, "E1").expect("delete"));
        assert!(!store.delete(&a, "E1").expect("delete again"));
    }

    #[test]
    fn test_find_by_secondary_key() {
        let store = StateStore::open_in_memory().expect("open store");
        let pair = PairId::new("work", "personal");
        store
            .upsert(&record(&pair, "P1", "mirror-1", Authority::Secondary))
            .expect("upsert");

        let found = store
            .find_by_secondary_key(&pair, "P1")
            .expect("query")
            .expect("found");
        assert_eq!(found.primary_key, "mirror-1");
        assert_eq!(found.authority, Authority::Secondary);
    }

    #[test]
    fn test_replace_moves_primary_key() {
        let mut store = StateStore::open_in_memory().expect("open store");
        let pair = PairId::new("work", "personal");
        let old = record(&pair, "P1", "mirror-1", Authority::Secondary);
        store.upsert(&old).expect("upsert");

        let new = old.resynced(&EventKey::new("mirror-2", None), "a".into(), "b".into());
        store.replace(&old.primary_key, &new).expect("replace");

        let records = store.list_for_pair(&pair).expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].primary_key, "mirror-2");
        assert_eq!(records[0].secondary_key, "P1");
    }

    #[test]
    fn test_status_aggregates_per_authority() {
        let store = StateStore::open_in_memory().expect("open store");
        let pair = PairId::new("work", "personal");

        let empty = store.status(&pair).expect("status");
        assert_eq!(empty.total(), 0);
        assert!(empty.last_synced_at.is_none());

        store.upsert(&record(&pair, "W1", "m1", Authority::Primary)).expect("upsert");
        store.upsert(&record(&pair, "W2", "m2", Authority::Primary)).expect("upsert");
        store.upsert(&record(&pair, "m3", "P1", Authority::Secondary)).expect("upsert");

        let status = store.status(&pair).expect("status");
        assert_eq!(status.primary_authority, 2);
        assert_eq!(status.secondary_authority, 1);
        assert!(status.last_synced_at.is_some());
    }

    #[test]
    fn test_migrate_calendar_id() {
        let mut store = StateStore::open_in_memory().expect("open store");
        let pair = PairId::new("old-work", "personal");
        store.upsert(&record(&pair, "W1", "m1", Authority::Primary)).expect("upsert");
        store.upsert(&record(&pair, "W2", "m2", Authority::Primary)).expect("upsert");

        let preview = store
            .migrate_calendar_id("old-work", "new-work", MigrateScope::Any, true)
            .expect("dry run");
        assert_eq!(preview.primary_rows, 2);
        assert_eq!(preview.secondary_rows, 0);
        assert_eq!(store.list_for_pair(&pair).expect("list").len(), 2);

        let result = store
            .migrate_calendar_id("old-work", "new-work", MigrateScope::Primary, false)
            .expect("migrate");
        assert_eq!(result.total(), 2);
        assert!(store.list_for_pair(&pair).expect("list").is_empty());
        assert_eq!(
            store
                .list_for_pair(&PairId::new("new-work", "personal"))
                .expect("list")
                .len(),
            2
        );
        assert_eq!(store.calendar_ids().expect("ids"), vec!["new-work", "personal"]);
    }
}
