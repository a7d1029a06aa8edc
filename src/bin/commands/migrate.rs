use std::sync::Arc;
use upgrader::database::{MigrationProgress, MigrationProgressCallback};
use upgrader::lens::migrate::{MigrateArgs, MigrateLens};
use upgrader::lens::utils::OutputFormat;
use upgrader::UpgraderConfig;

pub fn run(config: &UpgraderConfig, args: MigrateArgs, output_format: OutputFormat) {
    if args.dry_run {
        return super::plan::run(config, args, output_format);
    }

    let (db, catalog) = super::open_or_exit(config);
    let lens = MigrateLens::new(&db, &catalog, config.version_store);

    let progress: MigrationProgressCallback = Arc::new(|p: MigrationProgress| match p {
        MigrationProgress::Applying {
            version,
            step,
            total,
        } => eprintln!("[{}/{}] applying v{}", step, total, version),
        MigrationProgress::Aborted {
            version: Some(version),
            error,
        } => eprintln!("aborted, database remains at v{}: {}", version, error),
        MigrationProgress::Aborted {
            version: None,
            error,
        } => eprintln!("aborted: {}", error),
        _ => {}
    });

    match lens.migrate(&args, Some(progress), None) {
        Ok(report) => println!("{}", lens.format_report(&report, output_format)),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}
