//! Database module
//!
//! This module provides all database functionality, organized into:
//!
//! - **core**: SQLite connection management
//! - **migration**: the versioned schema migration engine
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/            # Foundation
//! │   └── connection   # SQLite DatabaseConn wrapper
//! │
//! └── migration/       # Schema versioning
//!     ├── catalog      # Ordered, validated migration steps
//!     ├── runner       # Applies pending steps, records versions
//!     ├── executor     # Atomic statement batches
//!     └── version_store# user_version / meta table persistence
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use upgrader::database::{DatabaseConn, migrate_sqlite, users_catalog, VersionStoreKind};
//!
//! let db = DatabaseConn::open_path("app.sqlite3")?;
//! let catalog = users_catalog()?;
//! let report = migrate_sqlite(&db.conn, &catalog, VersionStoreKind::UserVersion)?;
//! println!("v{} -> v{}", report.from_version, report.to_version);
//! ```

pub mod core;
pub mod migration;

pub use core::{DatabaseConn, DEFAULT_BUSY_TIMEOUT_MS};

pub use migration::{
    load_catalog_file, migrate_sqlite, open_version_store, users_catalog, AppliedStep,
    CancelFlag, CatalogError, CatalogFile, ExecError, MetaTableVersionStore, MigrationCatalog,
    MigrationError, MigrationPlan, MigrationProgress, MigrationProgressCallback, MigrationReport,
    MigrationRunner, MigrationStatus, MigrationStep, RunOutcome, SqliteExecutor,
    StatementExecutor, StoreError, UnitOfWork, UserVersionStore, VersionStore, VersionStoreKind,
};

/// Ensure the data directory exists
pub fn ensure_data_dir(data_dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory '{}': {}", data_dir, e))
}
