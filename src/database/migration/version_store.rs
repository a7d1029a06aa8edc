//! Schema version persistence
//!
//! Two SQLite-backed stores are provided:
//! - [`UserVersionStore`] keeps the version in the database header
//!   (`PRAGMA user_version`)
//! - [`MetaTableVersionStore`] keeps it as a `schema_version` row of a
//!   key/value meta table

use super::error::StoreError;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reads and durably records the schema version of one database
pub trait VersionStore {
    fn get_version(&mut self) -> Result<u32, StoreError>;

    fn set_version(&mut self, version: u32) -> Result<(), StoreError>;

    /// Largest version `set_version` accepts
    fn max_version(&self) -> u32 {
        u32::MAX
    }
}

/// Which version store a database uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionStoreKind {
    /// SQLite header field `user_version`
    #[default]
    UserVersion,
    /// `schema_version` row in the `upgrader_meta` table
    MetaTable,
}

impl fmt::Display for VersionStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserVersion => write!(f, "user-version"),
            Self::MetaTable => write!(f, "meta-table"),
        }
    }
}

impl FromStr for VersionStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "user-version" | "pragma" => Ok(Self::UserVersion),
            "meta-table" | "meta" => Ok(Self::MetaTable),
            _ => Err(format!(
                "unknown version store '{}', expected user-version or meta-table",
                s
            )),
        }
    }
}

/// Open the store of the given kind on `conn`
pub fn open_version_store<'a>(
    kind: VersionStoreKind,
    conn: &'a Connection,
) -> Box<dyn VersionStore + 'a> {
    match kind {
        VersionStoreKind::UserVersion => Box::new(UserVersionStore::new(conn)),
        VersionStoreKind::MetaTable => Box::new(MetaTableVersionStore::new(conn)),
    }
}

/// Version store backed by `PRAGMA user_version`
///
/// `user_version` is a signed 32-bit header field, so versions above
/// `i32::MAX` cannot be recorded.
pub struct UserVersionStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserVersionStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl VersionStore for UserVersionStore<'_> {
    fn get_version(&mut self) -> Result<u32, StoreError> {
        let raw: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        u32::try_from(raw).map_err(|_| StoreError::Malformed(raw.to_string()))
    }

    fn set_version(&mut self, version: u32) -> Result<(), StoreError> {
        // user_version is a signed 32-bit header field
        let value = i32::try_from(version).map_err(|_| {
            StoreError::Other(format!(
                "version {} does not fit in PRAGMA user_version",
                version
            ))
        })?;
        self.conn.pragma_update(None, "user_version", value)?;
        Ok(())
    }

    fn max_version(&self) -> u32 {
        i32::MAX as u32
    }
}

/// Version store backed by a key/value meta table
pub struct MetaTableVersionStore<'a> {
    conn: &'a Connection,
}

impl<'a> MetaTableVersionStore<'a> {
    pub const TABLE: &'static str = "upgrader_meta";
    pub const VERSION_KEY: &'static str = "schema_version";

    const CREATE_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS upgrader_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    "#;

    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn table_exists(&self) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [Self::TABLE],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl VersionStore for MetaTableVersionStore<'_> {
    fn get_version(&mut self) -> Result<u32, StoreError> {
        if !self.table_exists()? {
            return Ok(0);
        }

        let result: Result<String, _> = self.conn.query_row(
            "SELECT value FROM upgrader_meta WHERE key = ?1",
            [Self::VERSION_KEY],
            |row| row.get(0),
        );

        match result {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|_| StoreError::Malformed(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn set_version(&mut self, version: u32) -> Result<(), StoreError> {
        self.conn.execute_batch(Self::CREATE_TABLE)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO upgrader_meta (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))",
            [Self::VERSION_KEY, version.to_string().as_str()],
        )?;
        Ok(())
    }
}
