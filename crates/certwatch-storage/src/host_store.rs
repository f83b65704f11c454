use crate::error::{Result, StorageError};
use certwatch_common::types::{CertificateFacts, HostRecord, SeverityBand};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const HOST_RECORDS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS host_records (
    host TEXT PRIMARY KEY,
    facts_json TEXT,
    not_after INTEGER,
    last_checked_at INTEGER,
    last_notified_severity TEXT,
    last_notified_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_host_records_last_checked_at ON host_records(last_checked_at);
CREATE INDEX IF NOT EXISTS idx_host_records_not_after ON host_records(not_after);
";

const SELECT_COLUMNS: &str = "host, facts_json, last_checked_at, last_notified_severity, last_notified_at, created_at, updated_at";

/// Raw column values of one `host_records` row, decoded outside the rusqlite
/// row callback so JSON and enum errors surface as [`StorageError`].
struct RawRow {
    host: String,
    facts_json: Option<String>,
    last_checked_at: Option<i64>,
    last_notified_severity: Option<String>,
    last_notified_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            host: row.get(0)?,
            facts_json: row.get(1)?,
            last_checked_at: row.get(2)?,
            last_notified_severity: row.get(3)?,
            last_notified_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<HostRecord> {
        let facts = self
            .facts_json
            .as_deref()
            .map(serde_json::from_str::<CertificateFacts>)
            .transpose()?;
        let last_notified_severity = self
            .last_notified_severity
            .map(|s| {
                s.parse::<SeverityBand>().map_err(|_| StorageError::InvalidValue {
                    column: "last_notified_severity",
                    value: s,
                })
            })
            .transpose()?;
        Ok(HostRecord {
            host: self.host,
            facts,
            last_checked_at: self.last_checked_at.map(from_millis).transpose()?,
            last_notified_severity,
            last_notified_at: self.last_notified_at.map(from_millis).transpose()?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StorageError::InvalidValue {
        column: "timestamp",
        value: ms.to_string(),
    })
}

pub struct HostStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl HostStore {
    /// Opens (creating if needed) `data_dir/certwatch.db`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("certwatch.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(HOST_RECORDS_SCHEMA)?;
        tracing::info!(path = %db_path.display(), "Initialized host store");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(HOST_RECORDS_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts an empty record for every host not yet tracked. Existing
    /// records are left untouched. Returns how many records were created.
    pub fn ensure_hosts(&self, hosts: &[String], now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut created = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO host_records (host, created_at, updated_at) VALUES (?1, ?2, ?2)",
            )?;
            for host in hosts {
                created += stmt.execute(rusqlite::params![host, now.timestamp_millis()])?;
            }
        }
        tx.commit()?;
        if created > 0 {
            tracing::info!(created, "Registered new hosts");
        }
        Ok(created)
    }

    pub fn get_host_record(&self, host: &str) -> Result<Option<HostRecord>> {
        let conn = self.conn();
        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM host_records WHERE host = ?1"),
                rusqlite::params![host],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    /// Like [`get_host_record`](Self::get_host_record) but returns a fresh,
    /// never-checked record for untracked hosts.
    pub fn load_or_new(&self, host: &str, now: DateTime<Utc>) -> Result<HostRecord> {
        Ok(self
            .get_host_record(host)?
            .unwrap_or_else(|| HostRecord::new(host, now)))
    }

    /// Replaces the stored record for `record.host` in one statement.
    pub fn save_host_record(&self, record: &HostRecord) -> Result<()> {
        let facts_json = record
            .facts
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let not_after = record.facts.as_ref().map(|f| f.not_after.timestamp_millis());
        let conn = self.conn();
        conn.execute(
            "INSERT INTO host_records (host, facts_json, not_after, last_checked_at, last_notified_severity, last_notified_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(host) DO UPDATE SET
                facts_json = excluded.facts_json,
                not_after = excluded.not_after,
                last_checked_at = excluded.last_checked_at,
                last_notified_severity = excluded.last_notified_severity,
                last_notified_at = excluded.last_notified_at,
                updated_at = excluded.updated_at",
            rusqlite::params![
                record.host,
                facts_json,
                not_after,
                record.last_checked_at.map(|t| t.timestamp_millis()),
                record.last_notified_severity.map(|b| b.as_str()),
                record.last_notified_at.map(|t| t.timestamp_millis()),
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// All records, most recently checked first. Hosts that were never
    /// checked successfully come last, ordered by name.
    pub fn list_host_records(&self) -> Result<Vec<HostRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM host_records
             ORDER BY last_checked_at IS NULL, last_checked_at DESC, host ASC"
        ))?;
        let rows = stmt.query_map([], RawRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}
