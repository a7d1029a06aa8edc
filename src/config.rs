use crate::database::{
    open_version_store, DatabaseConn, MigrationCatalog, VersionStoreKind, DEFAULT_BUSY_TIMEOUT_MS,
};
use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub struct UpgraderConfig {
    /// Path to the directory holding the managed database
    pub data_dir: String,

    /// Database file name inside `data_dir`
    pub database: String,

    /// Where the schema version is recorded
    pub version_store: VersionStoreKind,

    /// How long to wait on a locked database, in milliseconds
    pub busy_timeout_ms: u64,

    /// Optional catalog file (TOML or JSON); the bundled catalog is used otherwise
    pub catalog: Option<String>,
}

const DEFAULT_DATABASE: &str = "upgrader.sqlite3";

const EMPTY_CONFIG: &str = r#"### upgrader configuration file

### directory holding the managed database
# data_dir = "~/.upgrader"

### database file name inside data_dir
# database = "upgrader.sqlite3"

### where the schema version is recorded: "user-version" or "meta-table"
# version_store = "user-version"

### how long to wait for a locked database (milliseconds)
# busy_timeout_ms = 5000

### catalog file with the migration steps (TOML or JSON)
# catalog = "~/.upgrader/catalog.toml"
"#;

impl Default for UpgraderConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            data_dir: format!("{}/.upgrader", home_dir),
            database: DEFAULT_DATABASE.to_string(),
            version_store: VersionStoreKind::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            catalog: None,
        }
    }
}

impl UpgraderConfig {
    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<UpgraderConfig> {
        let mut builder = Config::builder();

        // By default use $HOME/.upgrader/upgrader.toml as the configuration file path
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();

        let upgrader_dir = format!("{}/.upgrader", home_dir.as_str());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(upgrader_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create upgrader directory: {}", e))?;
                let p = format!("{}/upgrader.toml", upgrader_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // Add in settings from the environment (with a prefix of UPGRADER)
        // E.g., `UPGRADER_VERSION_STORE=meta-table ./upgrader status`
        builder = builder.add_source(config::Environment::with_prefix("UPGRADER"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config, &upgrader_dir)
    }

    /// Build a configuration from already-merged key/value settings
    fn from_map(config: &HashMap<String, String>, default_dir: &str) -> Result<UpgraderConfig> {
        let data_dir = match config.get("data_dir") {
            Some(p) => expand_home(p),
            None => {
                std::fs::create_dir_all(default_dir)
                    .map_err(|e| anyhow!("Unable to create data directory: {}", e))?;
                default_dir.to_string()
            }
        };

        let database = config
            .get("database")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let version_store = match config.get("version_store") {
            Some(s) => s.parse::<VersionStoreKind>().map_err(|e| anyhow!(e))?,
            None => VersionStoreKind::default(),
        };

        let busy_timeout_ms = match config.get("busy_timeout_ms") {
            Some(s) => s
                .parse()
                .map_err(|e| anyhow!("Invalid busy_timeout_ms '{}': {}", s, e))?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        let catalog = config.get("catalog").map(|p| expand_home(p));

        Ok(UpgraderConfig {
            data_dir,
            database,
            version_store,
            busy_timeout_ms,
            catalog,
        })
    }

    /// Get the path to the managed SQLite database file
    pub fn sqlite_path(&self) -> String {
        if Path::new(&self.database).is_absolute() {
            return self.database.clone();
        }
        let data_dir = self.data_dir.trim_end_matches('/');
        format!("{}/{}", data_dir, self.database)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Open the managed database with the configured settings
    pub fn open_database(&self) -> Result<DatabaseConn> {
        crate::database::ensure_data_dir(&self.data_dir)?;
        DatabaseConn::open_with_timeout(Some(&self.sqlite_path()), self.busy_timeout())
    }

    /// Load the configured catalog file, or the bundled `users` catalog
    pub fn load_catalog(&self) -> Result<MigrationCatalog> {
        match &self.catalog {
            Some(path) => crate::database::load_catalog_file(path),
            None => Ok(crate::database::users_catalog()?),
        }
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Data Directory: {}", self.data_dir),
            format!("Database:       {}", self.sqlite_path()),
            format!("Version Store:  {}", self.version_store),
            format!("Busy Timeout:   {} ms", self.busy_timeout_ms),
        ];
        lines.push(format!(
            "Catalog:        {}",
            self.catalog.as_deref().unwrap_or("(bundled users catalog)")
        ));
        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.upgrader/upgrader.toml", home_dir)
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}/{}", home.to_string_lossy(), rest),
        _ => path.to_string(),
    }
}

// =============================================================================
// Database Info
// =============================================================================

/// Information about the managed SQLite database
#[derive(Debug, Serialize, Clone)]
pub struct DatabaseInfo {
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub version_store: VersionStoreKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<String>,
}

/// Inspect the managed database without modifying it
pub fn get_database_info(config: &UpgraderConfig) -> DatabaseInfo {
    let path = config.sqlite_path();
    let exists = Path::new(&path).exists();
    let size_bytes = if exists {
        std::fs::metadata(&path).ok().map(|m| m.len())
    } else {
        None
    };

    let (schema_version, tables) = if exists {
        match DatabaseConn::open_read_only(&path, config.busy_timeout()) {
            Ok(db) => {
                let mut store = open_version_store(config.version_store, &db.conn);
                let version = store.get_version().ok();
                let tables = db.tables().unwrap_or_default();
                (version, tables)
            }
            Err(_) => (None, Vec::new()),
        }
    } else {
        (None, Vec::new())
    };

    DatabaseInfo {
        path,
        exists,
        size_bytes,
        version_store: config.version_store,
        schema_version,
        tables,
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
