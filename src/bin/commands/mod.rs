pub mod config;
pub mod migrate;
pub mod plan;
pub mod status;

use upgrader::database::{DatabaseConn, MigrationCatalog};
use upgrader::UpgraderConfig;

/// Open the configured database and load the configured catalog, exiting on failure
pub(crate) fn open_or_exit(config: &UpgraderConfig) -> (DatabaseConn, MigrationCatalog) {
    let catalog = match config.load_catalog() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    let db = match config.open_database() {
        Ok(db) => db,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    (db, catalog)
}
