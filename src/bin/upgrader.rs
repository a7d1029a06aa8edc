use clap::{Parser, Subcommand};
use tracing::Level;
use upgrader::lens::migrate::MigrateArgs;
use upgrader::*;

mod commands;

use commands::config::ConfigArgs;
use commands::status::StatusArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.upgrader/upgrader.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format: table, markdown, json, json-pretty, psv
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the recorded schema version and pending steps
    Status(StatusArgs),

    /// List the steps a migration would apply
    Plan(MigrateArgs),

    /// Apply pending migration steps
    Migrate(MigrateArgs),

    /// Show configuration and database file information
    Config(ConfigArgs),
}

fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            // filter spans/events with level DEBUG or higher.
            .with_max_level(Level::DEBUG)
            .init();
    }

    let config = match UpgraderConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Status(args) => commands::status::run(&config, args, cli.format),
        Commands::Plan(args) => commands::plan::run(&config, args, cli.format),
        Commands::Migrate(args) => commands::migrate::run(&config, args, cli.format),
        Commands::Config(args) => commands::config::run(&config, args, cli.format),
    }
}
