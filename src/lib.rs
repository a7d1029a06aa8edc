#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Upgrader - versioned schema migrations for SQLite
//!
//! Upgrader brings a SQLite database from whatever schema version it is at to
//! a target version by applying an ordered catalog of statement batches. Each
//! batch is applied atomically and the version is recorded after every batch,
//! so an interrupted or failed run can simply be retried.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (none) | Migration engine, config, lenses | `rusqlite`, `config` |
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | The `upgrader` binary | All above + `clap`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`database`]**: SQLite connection and the migration engine
//!   - `core`: connection management
//!   - `migration`: catalog, runner, executor and version stores
//! - **[`lens`]**: status / plan / migrate operations with output formatting
//! - **[`config`]**: configuration management
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use upgrader::database::{DatabaseConn, MigrationCatalog, MigrationStep};
//! use upgrader::database::{migrate_sqlite, VersionStoreKind};
//!
//! let catalog = MigrationCatalog::new(vec![
//!     MigrationStep::new(1, ["CREATE TABLE users(id INTEGER PRIMARY KEY, name TEXT NOT NULL)"]),
//!     MigrationStep::new(2, ["ALTER TABLE users ADD COLUMN email TEXT"]),
//! ])?;
//!
//! let db = DatabaseConn::open_path("app.sqlite3")?;
//! let report = migrate_sqlite(&db.conn, &catalog, VersionStoreKind::UserVersion)?;
//! assert_eq!(report.to_version, 2);
//! ```

pub mod config;
pub mod database;
pub mod lens;

// =============================================================================
// Configuration
// =============================================================================

pub use config::UpgraderConfig;
pub use config::{format_size, get_database_info, DatabaseInfo};

// =============================================================================
// Database Module - Re-export commonly used types
// =============================================================================

pub use database::DatabaseConn;

pub use database::{
    migrate_sqlite, CatalogError, MigrationCatalog, MigrationError, MigrationReport,
    MigrationRunner, MigrationStep, SqliteExecutor, StatementExecutor, VersionStore,
    VersionStoreKind,
};

// =============================================================================
// Lens Module
// =============================================================================

pub use lens::utils::OutputFormat;
