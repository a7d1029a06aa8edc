//! Bundled catalogs and catalog files
//!
//! Catalogs are normally authored in code. The CLI can also read one from a
//! TOML or JSON file shaped like:
//!
//! ```toml
//! [[steps]]
//! to_version = 1
//! statements = ["CREATE TABLE users(id INTEGER PRIMARY KEY, name TEXT NOT NULL)"]
//!
//! [[steps]]
//! to_version = 2
//! statements = ["ALTER TABLE users ADD COLUMN email TEXT"]
//! ```

use super::catalog::{MigrationCatalog, MigrationStep};
use super::error::CatalogError;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

/// On-disk catalog definition
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub steps: MigrationCatalog,
}

/// Load and validate a catalog from a `.toml` or `.json` file
pub fn load_catalog_file(path: &str) -> Result<MigrationCatalog> {
    if !Path::new(path).exists() {
        return Err(anyhow!("Catalog file '{}' does not exist", path));
    }

    let file = config::Config::builder()
        .add_source(config::File::with_name(path))
        .build()
        .map_err(|e| anyhow!("Failed to read catalog file '{}': {}", path, e))?
        .try_deserialize::<CatalogFile>()
        .map_err(|e| anyhow!("Invalid catalog file '{}': {}", path, e))?;

    Ok(file.steps)
}

/// The `users` table catalog
///
/// 1. create `users(id, name, active)`
/// 2. add `city`
/// 3. add `email`
pub fn users() -> Result<MigrationCatalog, CatalogError> {
    MigrationCatalog::new(vec![
        MigrationStep::new(
            1,
            [r#"CREATE TABLE IF NOT EXISTS users(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                active INTEGER DEFAULT 1
            );"#],
        ),
        MigrationStep::new(2, ["ALTER TABLE users ADD COLUMN city TEXT;"]),
        MigrationStep::new(3, ["ALTER TABLE users ADD COLUMN email TEXT;"]),
    ])
}
