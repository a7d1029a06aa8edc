use clap::Args;
use serde::Serialize;
use upgrader::lens::utils::OutputFormat;
use upgrader::{format_size, get_database_info, DatabaseInfo, UpgraderConfig};

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also list the tables of the managed database
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo {
    config_file: String,
    data_dir: String,
    busy_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<String>,
    database: DatabaseInfo,
}

pub fn run(config: &UpgraderConfig, args: ConfigArgs, output_format: OutputFormat) {
    let ConfigArgs { verbose } = args;

    let mut database = get_database_info(config);
    if !verbose {
        database.tables.clear();
    }

    let info = ConfigInfo {
        config_file: UpgraderConfig::config_file_path(),
        data_dir: config.data_dir.clone(),
        busy_timeout_ms: config.busy_timeout_ms,
        catalog: config.catalog.clone(),
        database,
    };

    if output_format.is_json() {
        println!("{}", output_format.to_json(&info));
        return;
    }

    println!("Config file:    {}", info.config_file);
    println!("{}", config.summary());
    println!();
    println!("SQLite Database:");
    println!(
        "  Status:         {}",
        if info.database.exists {
            "exists"
        } else {
            "not created"
        }
    );
    if let Some(size) = info.database.size_bytes {
        println!("  Size:           {}", format_size(size));
    }
    match info.database.schema_version {
        Some(v) => println!("  Schema version: v{}", v),
        None => println!("  Schema version: unknown"),
    }
    if verbose && !info.database.tables.is_empty() {
        println!("  Tables:         {}", info.database.tables.join(", "));
    }
}
