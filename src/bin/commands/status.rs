use clap::Args;
use upgrader::lens::migrate::MigrateLens;
use upgrader::lens::utils::OutputFormat;
use upgrader::UpgraderConfig;

/// Arguments for the Status command
#[derive(Args)]
pub struct StatusArgs {}

pub fn run(config: &UpgraderConfig, _args: StatusArgs, output_format: OutputFormat) {
    let (db, catalog) = super::open_or_exit(config);
    let lens = MigrateLens::new(&db, &catalog, config.version_store);

    match lens.status() {
        Ok(info) => println!("{}", lens.format_status(&info, output_format)),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}
