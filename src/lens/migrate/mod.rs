//! Migration lens
//!
//! Combines a database, a catalog and a version store into the operations the
//! CLI exposes: status, plan and migrate.
//!
//! # Example
//!
//! ```rust,ignore
//! use upgrader::database::{users_catalog, DatabaseConn, VersionStoreKind};
//! use upgrader::lens::migrate::{MigrateArgs, MigrateLens};
//!
//! let db = DatabaseConn::open_path("app.sqlite3")?;
//! let catalog = users_catalog()?;
//! let lens = MigrateLens::new(&db, &catalog, VersionStoreKind::UserVersion);
//!
//! let report = lens.migrate(&MigrateArgs::default(), None, None)?;
//! println!("{}", lens.format_report(&report, OutputFormat::Table));
//! ```

use crate::database::{
    open_version_store, CancelFlag, DatabaseConn, MigrationCatalog, MigrationProgressCallback,
    MigrationReport, MigrationRunner, MigrationStatus, SqliteExecutor, VersionStoreKind,
};
use crate::lens::utils::{preview_statement, render_table, OutputFormat, DEFAULT_PREVIEW_LEN};
use anyhow::Result;
use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// Current state of the managed database
#[derive(Debug, Clone, Serialize)]
pub struct MigrateStatusInfo {
    pub version_store: VersionStoreKind,
    pub current_version: u32,
    pub latest_version: u32,
    pub catalog_steps: usize,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

/// One pending step, as shown by `plan`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct PlanEntry {
    pub version: u32,
    pub statements: usize,
    pub first_statement: String,
}

// =============================================================================
// Args
// =============================================================================

/// Arguments for plan and migrate operations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::Args))]
pub struct MigrateArgs {
    /// Stop at this version instead of the latest catalog version
    #[cfg_attr(feature = "cli", clap(short, long))]
    #[serde(default)]
    pub target: Option<u32>,

    /// Show the pending steps without applying them
    #[cfg_attr(feature = "cli", clap(long))]
    #[serde(default)]
    pub dry_run: bool,
}

impl MigrateArgs {
    pub fn with_target(mut self, target: u32) -> Self {
        self.target = Some(target);
        self
    }
}

// =============================================================================
// Lens
// =============================================================================

pub struct MigrateLens<'a> {
    db: &'a DatabaseConn,
    catalog: &'a MigrationCatalog,
    store_kind: VersionStoreKind,
}

impl<'a> MigrateLens<'a> {
    pub fn new(
        db: &'a DatabaseConn,
        catalog: &'a MigrationCatalog,
        store_kind: VersionStoreKind,
    ) -> Self {
        Self {
            db,
            catalog,
            store_kind,
        }
    }

    pub fn status(&self) -> Result<MigrateStatusInfo> {
        let mut store = open_version_store(self.store_kind, &self.db.conn);
        let runner = MigrationRunner::new(self.catalog);
        let status = runner.check_status(store.as_mut())?;
        let current_version = match &status {
            MigrationStatus::UpToDate { version } => *version,
            MigrationStatus::Pending { from, .. } => *from,
            MigrationStatus::AheadOfCatalog {
                database_version, ..
            } => *database_version,
        };

        Ok(MigrateStatusInfo {
            version_store: self.store_kind,
            current_version,
            latest_version: self.catalog.latest_version(),
            catalog_steps: self.catalog.len(),
            status,
        })
    }

    /// Steps a migrate call with the same args would apply
    pub fn plan(&self, args: &MigrateArgs) -> Result<Vec<PlanEntry>> {
        let mut store = open_version_store(self.store_kind, &self.db.conn);
        let plan = MigrationRunner::new(self.catalog)
            .with_target(args.target)
            .plan(store.as_mut())?;

        Ok(plan
            .steps
            .iter()
            .map(|step| PlanEntry {
                version: step.to_version(),
                statements: step.statements().len(),
                first_statement: step
                    .statements()
                    .first()
                    .map(|s| preview_statement(s, DEFAULT_PREVIEW_LEN))
                    .unwrap_or_default(),
            })
            .collect())
    }

    /// Apply pending steps
    ///
    /// `args.dry_run` is not consulted here; callers use [`plan`](Self::plan)
    /// for dry runs.
    pub fn migrate(
        &self,
        args: &MigrateArgs,
        progress: Option<MigrationProgressCallback>,
        cancel: Option<CancelFlag>,
    ) -> Result<MigrationReport> {
        let mut executor = SqliteExecutor::new(&self.db.conn);
        let mut store = open_version_store(self.store_kind, &self.db.conn);

        let mut runner = MigrationRunner::new(self.catalog).with_target(args.target);
        if let Some(cb) = progress {
            runner = runner.with_progress(cb);
        }
        if let Some(flag) = cancel {
            runner = runner.with_cancel_flag(flag);
        }

        Ok(runner.run(&mut executor, store.as_mut())?)
    }

    pub fn format_plan(&self, entries: &[PlanEntry], format: OutputFormat) -> String {
        match format {
            OutputFormat::Table | OutputFormat::Markdown => render_table(entries, format),
            OutputFormat::Json | OutputFormat::JsonPretty => format.to_json(entries),
            OutputFormat::Psv => {
                let mut lines = vec!["version|statements|first_statement".to_string()];
                lines.extend(entries.iter().map(|e| {
                    format!("{}|{}|{}", e.version, e.statements, e.first_statement)
                }));
                lines.join("\n")
            }
        }
    }

    pub fn format_report(&self, report: &MigrationReport, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json | OutputFormat::JsonPretty => format.to_json(report),
            OutputFormat::Psv => {
                let mut lines = vec!["version|statements|duration_secs".to_string()];
                lines.extend(report.applied.iter().map(|s| {
                    format!("{}|{}|{:.3}", s.version, s.statements, s.duration_secs)
                }));
                lines.join("\n")
            }
            OutputFormat::Table | OutputFormat::Markdown => {
                let mut out = format!(
                    "v{} -> v{} ({:?}, {:.3}s)",
                    report.from_version, report.to_version, report.outcome, report.duration_secs
                );
                if !report.applied.is_empty() {
                    out.push('\n');
                    out.push_str(&render_table(&report.applied, format));
                }
                out
            }
        }
    }

    pub fn format_status(&self, info: &MigrateStatusInfo, format: OutputFormat) -> String {
        if format.is_json() {
            return format.to_json(info);
        }

        let state = match &info.status {
            MigrationStatus::UpToDate { .. } => "up to date".to_string(),
            MigrationStatus::Pending { steps, .. } => format!("{} step(s) pending", steps),
            MigrationStatus::AheadOfCatalog { .. } => "ahead of catalog".to_string(),
        };

        if format == OutputFormat::Psv {
            return format!(
                "version_store|current_version|latest_version|status\n{}|{}|{}|{}",
                info.version_store, info.current_version, info.latest_version, state
            );
        }

        [
            format!("Version store:   {}", info.version_store),
            format!("Current version: {}", info.current_version),
            format!(
                "Latest version:  {} ({} step(s) in catalog)",
                info.latest_version, info.catalog_steps
            ),
            format!("Status:          {}", state),
        ]
        .join("\n")
    }
}

// =============================================================================
// Tests
// =============================================================================
