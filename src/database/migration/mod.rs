//! Versioned schema migrations
//!
//! - `catalog`: ordered, validated list of migration steps
//! - `runner`: applies pending steps and records progress
//! - `executor`: statement execution in atomic units (SQLite implementation)
//! - `version_store`: schema version persistence (SQLite implementations)
//! - `catalogs`: bundled catalogs and catalog file loading

mod catalog;
mod catalogs;
mod error;
mod executor;
mod runner;
mod version_store;

pub use catalog::{MigrationCatalog, MigrationStep};
pub use catalogs::{load_catalog_file, users as users_catalog, CatalogFile};
pub use error::{CatalogError, ExecError, MigrationError, StoreError};
pub use executor::{SqliteExecutor, StatementExecutor, UnitOfWork};
pub use runner::{
    AppliedStep, CancelFlag, MigrationPlan, MigrationProgress, MigrationProgressCallback,
    MigrationReport, MigrationRunner, MigrationStatus, RunOutcome,
};
pub use version_store::{
    open_version_store, MetaTableVersionStore, UserVersionStore, VersionStore, VersionStoreKind,
};

use rusqlite::Connection;

/// Bring the SQLite database behind `conn` up to the latest catalog version
pub fn migrate_sqlite(
    conn: &Connection,
    catalog: &MigrationCatalog,
    store: VersionStoreKind,
) -> Result<MigrationReport, MigrationError> {
    let mut executor = SqliteExecutor::new(conn);
    let mut store = open_version_store(store, conn);
    MigrationRunner::new(catalog).run(&mut executor, store.as_mut())
}
