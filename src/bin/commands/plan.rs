use upgrader::lens::migrate::{MigrateArgs, MigrateLens};
use upgrader::lens::utils::OutputFormat;
use upgrader::UpgraderConfig;

pub fn run(config: &UpgraderConfig, args: MigrateArgs, output_format: OutputFormat) {
    let (db, catalog) = super::open_or_exit(config);
    let lens = MigrateLens::new(&db, &catalog, config.version_store);

    match lens.plan(&args) {
        Ok(entries) if entries.is_empty() && !output_format.is_json() => {
            eprintln!("Nothing to apply, database is up to date");
        }
        Ok(entries) => println!("{}", lens.format_plan(&entries, output_format)),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}
