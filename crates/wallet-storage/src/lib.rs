use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;
use wallet_core::EligibilityFlag;

pub const KV_SCHEMA_VERSION: i64 = 1;

/// Key under which the trusted traveler eligibility record is persisted.
pub const ELIGIBILITY_KEY: &str = "trustedTraveler";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error for key {key}: {reason}")]
    Serialization { key: String, reason: String },
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("store connection lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub value_json: String,
    pub updated_at: DateTime<Utc>,
}

/// Persisted key/value store holding JSON documents.
pub struct KvStore {
    conn: Mutex<Connection>,
}

impl KvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn()?
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > KV_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: KV_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_kv_store.sql");
            let conn = self.conn()?;
            conn.execute_batch(sql)?;
            conn.execute("PRAGMA user_version = 1", []).map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn()?
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    pub fn get_entry(&self, key: &str) -> Result<Option<StoredEntry>, StorageError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT key, value_json, updated_at FROM kv_entries WHERE key = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(key, value_json, updated_at)| {
            Ok(StoredEntry {
                key,
                value_json,
                updated_at: parse_ts(&updated_at)?,
            })
        })
        .transpose()
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(entry) = self.get_entry(key)? else {
            debug!(event = "kv_miss", key);
            return Ok(None);
        };
        serde_json::from_str(&entry.value_json)
            .map(Some)
            .map_err(|err| StorageError::Serialization {
                key: key.to_string(),
                reason: err.to_string(),
            })
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value_json =
            serde_json::to_string(value).map_err(|err| StorageError::Serialization {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
        self.conn()?.execute(
            "
            INSERT INTO kv_entries (key, value_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value_json=excluded.value_json,
                updated_at=excluded.updated_at
            ",
            params![key, value_json, Utc::now().to_rfc3339()],
        )?;
        debug!(event = "kv_write", key);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let changes = self
            .conn()?
            .execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
        Ok(changes > 0)
    }

    /// Absent record means "not yet determined", which is different from a
    /// stored `hasCredential: false`.
    pub fn read_eligibility(&self, key: &str) -> Result<Option<EligibilityFlag>, StorageError> {
        self.get_json(key)
    }

    pub fn write_eligibility(&self, key: &str, flag: &EligibilityFlag) -> Result<(), StorageError> {
        self.set_json(key, flag)
    }
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(format!("{value}: {err}")))
}
