//! Error types for schema migrations

use thiserror::Error;

/// Malformed catalog definitions, or requests the catalog cannot satisfy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A step does not target a version strictly above its predecessor
    #[error("step version {found} is not greater than preceding step version {previous}")]
    NonMonotonicVersion { previous: u32, found: u32 },

    /// Version 0 is the empty database and cannot be a migration target
    #[error("step at position {position} targets version 0; migration targets start at 1")]
    ZeroVersion { position: usize },

    /// The requested target is below the version the database is already at
    #[error("database is at version {current}, cannot downgrade to version {target}")]
    NoDowngradeSupport { current: u32, target: u32 },
}

/// Failure reported by a [`StatementExecutor`](super::StatementExecutor)
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Executor-specific failure that does not come from SQLite
    #[error("{0}")]
    Other(String),
}

/// Failure reported by a [`VersionStore`](super::VersionStore)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store holds a value that is not a non-negative integer
    #[error("malformed schema version value '{0}'")]
    Malformed(String),

    /// Store-specific failure that does not come from SQLite
    #[error("{0}")]
    Other(String),
}

/// Errors returned by [`MigrationRunner::run`](super::MigrationRunner::run)
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The current version could not be read; nothing was applied
    #[error("failed to read schema version: {0}")]
    VersionRead(#[source] StoreError),

    /// A statement of the batch for `version` failed and the batch was rolled back
    #[error("migration to version {version} failed at statement {statement_index}: {source}")]
    StatementExecution {
        version: u32,
        statement_index: usize,
        #[source]
        source: ExecError,
    },

    /// A pending step targets a version the version store cannot record;
    /// nothing was applied
    #[error("version {version} exceeds the largest version the store can record ({max})")]
    VersionOutOfRange { version: u32, max: u32 },

    /// The batch for `version` was committed but the version could not be recorded
    #[error("schema was migrated to version {version} but the version could not be recorded: {source}")]
    VersionPersist {
        version: u32,
        #[source]
        source: StoreError,
    },
}

impl MigrationError {
    /// The catalog version the failure is attributed to, if any
    pub fn version(&self) -> Option<u32> {
        match self {
            MigrationError::StatementExecution { version, .. }
            | MigrationError::VersionOutOfRange { version, .. }
            | MigrationError::VersionPersist { version, .. } => Some(*version),
            MigrationError::Catalog(CatalogError::NonMonotonicVersion { found, .. }) => {
                Some(*found)
            }
            MigrationError::Catalog(CatalogError::NoDowngradeSupport { target, .. }) => {
                Some(*target)
            }
            _ => None,
        }
    }
}
