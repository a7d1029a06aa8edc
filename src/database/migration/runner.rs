//! Migration runner
//!
//! Drives a database from its recorded version up to a target version:
//!
//! ```text
//! Idle -> Checking -> Applying(step) -> Persisting(step) -> ... -> Complete
//!                          \                 \
//!                           +-----------------+--> Aborted
//! ```
//!
//! Each step's batch runs inside one unit of work. The new version is
//! recorded only after the batch commits, one step at a time, so the
//! recorded version always names the last fully applied step and a failed
//! run can simply be retried.

use super::catalog::{MigrationCatalog, MigrationStep};
use super::error::{CatalogError, MigrationError};
use super::executor::{StatementExecutor, UnitOfWork};
use super::version_store::VersionStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// =============================================================================
// Progress Tracking Types
// =============================================================================

/// Progress information for migration runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MigrationProgress {
    /// Reading the current version
    Checking,
    /// Running the batch of a step
    Applying {
        version: u32,
        /// Position of this step within the pending steps (1-based)
        step: usize,
        /// Number of pending steps in this run
        total: usize,
    },
    /// Batch committed, recording the new version
    Persisting { version: u32 },
    /// All pending steps applied
    Complete {
        version: u32,
        steps_applied: usize,
        elapsed_secs: f64,
    },
    /// Cancellation observed between steps
    Cancelled { version: u32 },
    /// Run stopped on an error
    ///
    /// `version` is the recorded version the database remains at, or `None`
    /// when it could not be read.
    Aborted {
        version: Option<u32>,
        error: String,
    },
}

/// Callback type for migration progress updates
pub type MigrationProgressCallback = Arc<dyn Fn(MigrationProgress) + Send + Sync>;

/// Cooperative cancellation for a migration run
///
/// Checked before each pending step; a batch in flight always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Types
// =============================================================================

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    /// Nothing was pending
    UpToDate,
    /// Every pending step was applied
    Completed,
    /// Stopped between steps on request
    Cancelled,
}

/// A step applied during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct AppliedStep {
    pub version: u32,
    pub statements: usize,
    pub duration_secs: f64,
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Version recorded before the run
    pub from_version: u32,
    /// Version recorded after the run
    pub to_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
    pub outcome: RunOutcome,
    pub applied: Vec<AppliedStep>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl MigrationReport {
    pub fn steps_applied(&self) -> usize {
        self.applied.len()
    }
}

/// Pending work computed for a database without applying anything
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationPlan {
    pub current_version: u32,
    /// Version the database would be at after applying `steps`
    pub target_version: u32,
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Relation between a database's recorded version and the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum MigrationStatus {
    /// Database is at the latest catalog version
    UpToDate { version: u32 },

    /// Catalog has steps the database has not applied
    Pending { from: u32, to: u32, steps: usize },

    /// Database records a version newer than anything in the catalog
    AheadOfCatalog {
        database_version: u32,
        catalog_version: u32,
    },
}

// =============================================================================
// Runner
// =============================================================================

/// Applies catalog steps to bring a database up to date
///
/// The runner holds no connection of its own: executor and version store are
/// passed to each call. Callers must make sure only one run is active per
/// database at a time.
///
/// # Example
///
/// ```rust,ignore
/// use upgrader::database::migration::{
///     MigrationCatalog, MigrationRunner, MigrationStep, SqliteExecutor, UserVersionStore,
/// };
///
/// let catalog = MigrationCatalog::new(vec![
///     MigrationStep::new(1, ["CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)"]),
/// ])?;
///
/// let mut executor = SqliteExecutor::new(&conn);
/// let mut store = UserVersionStore::new(&conn);
/// let report = MigrationRunner::new(&catalog).run(&mut executor, &mut store)?;
/// println!("now at v{}", report.to_version);
/// ```
pub struct MigrationRunner<'c> {
    catalog: &'c MigrationCatalog,
    target: Option<u32>,
    cancel: Option<CancelFlag>,
    progress: Option<MigrationProgressCallback>,
}

impl<'c> MigrationRunner<'c> {
    pub fn new(catalog: &'c MigrationCatalog) -> Self {
        Self {
            catalog,
            target: None,
            cancel: None,
            progress: None,
        }
    }

    /// Stop at the highest step whose version is `<= target`
    pub fn with_target(mut self, target: Option<u32>) -> Self {
        self.target = target;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, callback: MigrationProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn catalog(&self) -> &MigrationCatalog {
        self.catalog
    }

    fn emit(&self, progress: MigrationProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Compare the recorded version with the catalog
    pub fn check_status<S>(&self, store: &mut S) -> Result<MigrationStatus, MigrationError>
    where
        S: VersionStore + ?Sized,
    {
        let current = store.get_version().map_err(MigrationError::VersionRead)?;
        let latest = self.catalog.latest_version();
        let pending = self.catalog.steps_after(current);

        if current > latest {
            Ok(MigrationStatus::AheadOfCatalog {
                database_version: current,
                catalog_version: latest,
            })
        } else if pending.is_empty() {
            Ok(MigrationStatus::UpToDate { version: current })
        } else {
            Ok(MigrationStatus::Pending {
                from: current,
                to: latest,
                steps: pending.len(),
            })
        }
    }

    /// Compute the steps a run would apply, without applying them
    pub fn plan<S>(&self, store: &mut S) -> Result<MigrationPlan, MigrationError>
    where
        S: VersionStore + ?Sized,
    {
        let current = store.get_version().map_err(MigrationError::VersionRead)?;
        let pending = self.pending_steps(current)?;

        Ok(MigrationPlan {
            current_version: current,
            target_version: pending.last().map(|s| s.to_version()).unwrap_or(current),
            steps: pending.to_vec(),
        })
    }

    fn pending_steps(&self, current: u32) -> Result<&'c [MigrationStep], CatalogError> {
        if let Some(target) = self.target {
            if target < current {
                return Err(CatalogError::NoDowngradeSupport { current, target });
            }
        }
        Ok(self.catalog.steps_between(current, self.target))
    }

    /// Apply every pending step, in ascending version order
    ///
    /// Stops at the first failure. Steps applied before the failure stay
    /// applied and recorded; the failing batch leaves no trace.
    pub fn run<E, S>(
        &self,
        executor: &mut E,
        store: &mut S,
    ) -> Result<MigrationReport, MigrationError>
    where
        E: StatementExecutor + ?Sized,
        S: VersionStore + ?Sized,
    {
        let started_at = Utc::now();
        let start = Instant::now();

        self.emit(MigrationProgress::Checking);
        let from_version = match store.get_version() {
            Ok(v) => v,
            Err(e) => {
                let err = MigrationError::VersionRead(e);
                error!("{}", err);
                self.emit(MigrationProgress::Aborted {
                    version: None,
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let max_version = store.max_version();
        let pending = match self
            .pending_steps(from_version)
            .map_err(MigrationError::from)
            .and_then(|p| check_version_range(p, max_version).map(|()| p))
        {
            Ok(p) => p,
            Err(err) => return Err(self.abort_before_start(from_version, err)),
        };

        let mut report = MigrationReport {
            from_version,
            to_version: from_version,
            target: self.target,
            outcome: RunOutcome::UpToDate,
            applied: Vec::with_capacity(pending.len()),
            started_at,
            duration_secs: 0.0,
        };

        if pending.is_empty() {
            if from_version > self.catalog.latest_version() {
                warn!(
                    "Database is at v{}, newer than the latest catalog version v{}",
                    from_version,
                    self.catalog.latest_version()
                );
            } else {
                info!("Database schema is up to date at v{}", from_version);
            }
            report.duration_secs = start.elapsed().as_secs_f64();
            self.emit(MigrationProgress::Complete {
                version: from_version,
                steps_applied: 0,
                elapsed_secs: report.duration_secs,
            });
            return Ok(report);
        }

        info!(
            "Migrating database from v{} to v{} ({} step(s))",
            from_version,
            pending.last().map(|s| s.to_version()).unwrap_or(from_version),
            pending.len()
        );

        let total = pending.len();
        for (idx, step) in pending.iter().enumerate() {
            if self.is_cancelled() {
                info!(
                    "Migration cancelled at v{}, {} step(s) left",
                    report.to_version,
                    total - idx
                );
                report.outcome = RunOutcome::Cancelled;
                report.duration_secs = start.elapsed().as_secs_f64();
                self.emit(MigrationProgress::Cancelled {
                    version: report.to_version,
                });
                return Ok(report);
            }

            self.emit(MigrationProgress::Applying {
                version: step.to_version(),
                step: idx + 1,
                total,
            });

            let step_start = Instant::now();
            if let Err(err) = self.apply_step(executor, store, step) {
                error!("{}", err);
                self.emit(MigrationProgress::Aborted {
                    version: Some(report.to_version),
                    error: err.to_string(),
                });
                return Err(err);
            }

            let duration_secs = step_start.elapsed().as_secs_f64();
            info!(
                "Applied migration v{} ({} statement(s), {:.3}s)",
                step.to_version(),
                step.statements().len(),
                duration_secs
            );
            report.to_version = step.to_version();
            report.applied.push(AppliedStep {
                version: step.to_version(),
                statements: step.statements().len(),
                duration_secs,
            });
        }

        report.outcome = RunOutcome::Completed;
        report.duration_secs = start.elapsed().as_secs_f64();
        self.emit(MigrationProgress::Complete {
            version: report.to_version,
            steps_applied: report.applied.len(),
            elapsed_secs: report.duration_secs,
        });

        Ok(report)
    }

    fn abort_before_start(&self, version: u32, err: MigrationError) -> MigrationError {
        error!("{}", err);
        self.emit(MigrationProgress::Aborted {
            version: Some(version),
            error: err.to_string(),
        });
        err
    }

    /// Run one batch in its own unit of work, then record its version
    ///
    /// A failure to begin the unit is reported at statement index 0 and a
    /// failure to commit at index `statements.len()`.
    fn apply_step<E, S>(
        &self,
        executor: &mut E,
        store: &mut S,
        step: &MigrationStep,
    ) -> Result<(), MigrationError>
    where
        E: StatementExecutor + ?Sized,
        S: VersionStore + ?Sized,
    {
        let version = step.to_version();
        let mut unit =
            UnitOfWork::begin(executor).map_err(|source| MigrationError::StatementExecution {
                version,
                statement_index: 0,
                source,
            })?;

        for (statement_index, statement) in step.statements().iter().enumerate() {
            if let Err(source) = unit.execute(statement) {
                if let Err(e) = unit.rollback() {
                    error!("Rollback of migration v{} failed: {}", version, e);
                }
                return Err(MigrationError::StatementExecution {
                    version,
                    statement_index,
                    source,
                });
            }
        }

        unit.commit()
            .map_err(|source| MigrationError::StatementExecution {
                version,
                statement_index: step.statements().len(),
                source,
            })?;

        self.emit(MigrationProgress::Persisting { version });
        debug!("Recording schema version v{}", version);
        store
            .set_version(version)
            .map_err(|source| MigrationError::VersionPersist { version, source })
    }
}

/// Reject a run whose steps the store could not record
///
/// Checked before any batch runs, so no batch is committed whose version
/// would then fail to persist.
fn check_version_range(pending: &[MigrationStep], max: u32) -> Result<(), MigrationError> {
    match pending.iter().find(|s| s.to_version() > max) {
        Some(step) => Err(MigrationError::VersionOutOfRange {
            version: step.to_version(),
            max,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::migration::error::{ExecError, StoreError};
    use crate::database::migration::executor::SqliteExecutor;
    use crate::database::migration::version_store::{
        open_version_store, MetaTableVersionStore, UserVersionStore, VersionStoreKind,
    };
    use crate::database::DatabaseConn;
    use rusqlite::Connection;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Executor that records calls and fails on a chosen statement
    #[derive(Default)]
    struct RecordingExecutor {
        log: Vec<String>,
        executed: usize,
        fail_on: Option<String>,
        fail_commit: bool,
    }

    impl StatementExecutor for RecordingExecutor {
        fn begin_unit(&mut self) -> Result<(), ExecError> {
            self.log.push("begin".to_string());
            Ok(())
        }

        fn execute(&mut self, statement: &str) -> Result<(), ExecError> {
            if self.fail_on.as_deref() == Some(statement) {
                return Err(ExecError::Other(format!("boom: {}", statement)));
            }
            self.executed += 1;
            self.log.push(statement.to_string());
            Ok(())
        }

        fn commit_unit(&mut self) -> Result<(), ExecError> {
            if self.fail_commit {
                return Err(ExecError::Other("disk full".to_string()));
            }
            self.log.push("commit".to_string());
            Ok(())
        }

        fn rollback_unit(&mut self) -> Result<(), ExecError> {
            self.log.push("rollback".to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        version: u32,
        history: Vec<u32>,
        fail_read: bool,
        fail_write_at: Option<u32>,
    }

    impl VersionStore for MemoryStore {
        fn get_version(&mut self) -> Result<u32, StoreError> {
            if self.fail_read {
                return Err(StoreError::Malformed("garbage".to_string()));
            }
            Ok(self.version)
        }

        fn set_version(&mut self, version: u32) -> Result<(), StoreError> {
            if self.fail_write_at == Some(version) {
                return Err(StoreError::Other("read-only".to_string()));
            }
            self.version = version;
            self.history.push(version);
            Ok(())
        }
    }

    fn catalog() -> MigrationCatalog {
        MigrationCatalog::new(vec![
            MigrationStep::new(1, ["s1a", "s1b"]),
            MigrationStep::new(2, ["s2a"]),
            MigrationStep::new(3, ["s3a", "s3b"]),
        ])
        .unwrap()
    }

    fn users_catalog() -> MigrationCatalog {
        MigrationCatalog::new(vec![
            MigrationStep::new(
                1,
                ["CREATE TABLE users(id INTEGER PRIMARY KEY, name TEXT NOT NULL, active INTEGER DEFAULT 1)"],
            ),
            MigrationStep::new(2, ["ALTER TABLE users ADD COLUMN city TEXT"]),
            MigrationStep::new(3, ["ALTER TABLE users ADD COLUMN email TEXT"]),
        ])
        .unwrap()
    }

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        names
    }

    #[test]
    fn test_applies_all_steps_in_order() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore::default();

        let report = MigrationRunner::new(&cat).run(&mut exec, &mut store).unwrap();

        assert_eq!(report.from_version, 0);
        assert_eq!(report.to_version, 3);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.steps_applied(), 3);
        assert_eq!(store.history, vec![1, 2, 3]);
        assert_eq!(
            exec.log,
            vec![
                "begin", "s1a", "s1b", "commit", "begin", "s2a", "commit", "begin", "s3a", "s3b",
                "commit"
            ]
        );
    }

    #[test]
    fn test_second_run_is_noop() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore::default();
        let runner = MigrationRunner::new(&cat);

        runner.run(&mut exec, &mut store).unwrap();
        let executed = exec.executed;

        let report = runner.run(&mut exec, &mut store).unwrap();
        assert_eq!(report.outcome, RunOutcome::UpToDate);
        assert_eq!(report.to_version, 3);
        assert_eq!(exec.executed, executed);
        assert_eq!(store.history, vec![1, 2, 3]);
    }

    #[test]
    fn test_target_version() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore::default();

        let report = MigrationRunner::new(&cat)
            .with_target(Some(2))
            .run(&mut exec, &mut store)
            .unwrap();

        assert_eq!(report.to_version, 2);
        assert_eq!(store.version, 2);
        assert!(!exec.log.contains(&"s3a".to_string()));
    }

    #[test]
    fn test_target_between_versions() {
        let cat = MigrationCatalog::new(vec![
            MigrationStep::new(1, ["a"]),
            MigrationStep::new(5, ["b"]),
        ])
        .unwrap();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore::default();

        let report = MigrationRunner::new(&cat)
            .with_target(Some(4))
            .run(&mut exec, &mut store)
            .unwrap();
        assert_eq!(report.to_version, 1);
    }

    #[test]
    fn test_downgrade_is_rejected() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore {
            version: 3,
            ..Default::default()
        };

        let err = MigrationRunner::new(&cat)
            .with_target(Some(1))
            .run(&mut exec, &mut store)
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::Catalog(CatalogError::NoDowngradeSupport {
                current: 3,
                target: 1
            })
        ));
        assert!(exec.log.is_empty());
        assert_eq!(store.version, 3);
    }

    #[test]
    fn test_version_read_failure_aborts() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore {
            fail_read: true,
            ..Default::default()
        };

        let err = MigrationRunner::new(&cat)
            .run(&mut exec, &mut store)
            .unwrap_err();

        assert!(matches!(err, MigrationError::VersionRead(_)));
        assert!(exec.log.is_empty());
        assert!(store.history.is_empty());
    }

    #[test]
    fn test_version_read_failure_reports_unknown_version() {
        let cat = catalog();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: MigrationProgressCallback = Arc::new(move |p: MigrationProgress| {
            sink.lock().unwrap().push(p);
        });

        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore {
            fail_read: true,
            ..Default::default()
        };
        assert!(MigrationRunner::new(&cat)
            .with_progress(callback)
            .run(&mut exec, &mut store)
            .is_err());

        let events = events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(MigrationProgress::Aborted { version: None, .. })
        ));
    }

    #[test]
    fn test_statement_failure_reports_remaining_version() {
        let cat = catalog();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: MigrationProgressCallback = Arc::new(move |p: MigrationProgress| {
            sink.lock().unwrap().push(p);
        });

        let mut exec = RecordingExecutor {
            fail_on: Some("s2a".to_string()),
            ..Default::default()
        };
        let mut store = MemoryStore::default();
        assert!(MigrationRunner::new(&cat)
            .with_progress(callback)
            .run(&mut exec, &mut store)
            .is_err());

        let events = events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(MigrationProgress::Aborted {
                version: Some(1),
                ..
            })
        ));
    }

    #[test]
    fn test_version_beyond_store_range_applies_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        let cat = MigrationCatalog::new(vec![
            MigrationStep::new(1, ["CREATE TABLE a (id INTEGER)"]),
            MigrationStep::new(1 << 31, ["CREATE TABLE b (id INTEGER)"]),
        ])
        .unwrap();

        let mut exec = SqliteExecutor::new(&conn);
        let mut store = UserVersionStore::new(&conn);
        let err = MigrationRunner::new(&cat)
            .run(&mut exec, &mut store)
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::VersionOutOfRange {
                version: 2147483648,
                max: 2147483647
            }
        ));
        assert_eq!(store.get_version().unwrap(), 0);
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type='table'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(tables, 0);

        // Stopping below the limit is fine
        let report = MigrationRunner::new(&cat)
            .with_target(Some(1))
            .run(&mut exec, &mut store)
            .unwrap();
        assert_eq!(report.to_version, 1);
    }

    #[test]
    fn test_statement_failure_stops_run() {
        let cat = catalog();
        let mut exec = RecordingExecutor {
            fail_on: Some("s3b".to_string()),
            ..Default::default()
        };
        let mut store = MemoryStore::default();

        let err = MigrationRunner::new(&cat)
            .run(&mut exec, &mut store)
            .unwrap_err();

        match err {
            MigrationError::StatementExecution {
                version,
                statement_index,
                ..
            } => {
                assert_eq!(version, 3);
                assert_eq!(statement_index, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(store.version, 2);
        assert_eq!(exec.log.last().map(String::as_str), Some("rollback"));
    }

    #[test]
    fn test_failure_does_not_attempt_later_steps() {
        let cat = catalog();
        let mut exec = RecordingExecutor {
            fail_on: Some("s1b".to_string()),
            ..Default::default()
        };
        let mut store = MemoryStore::default();

        assert!(MigrationRunner::new(&cat).run(&mut exec, &mut store).is_err());
        assert_eq!(exec.log, vec!["begin", "s1a", "rollback"]);
        assert_eq!(store.version, 0);
        assert!(store.history.is_empty());
    }

    #[test]
    fn test_commit_failure_is_reported_past_last_statement() {
        let cat = catalog();
        let mut exec = RecordingExecutor {
            fail_commit: true,
            ..Default::default()
        };
        let mut store = MemoryStore::default();

        let err = MigrationRunner::new(&cat)
            .run(&mut exec, &mut store)
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::StatementExecution {
                version: 1,
                statement_index: 2,
                ..
            }
        ));
        assert!(store.history.is_empty());
        assert_eq!(exec.log, vec!["begin", "s1a", "s1b", "rollback"]);
    }

    #[test]
    fn test_version_persist_failure_is_fatal() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore {
            fail_write_at: Some(2),
            ..Default::default()
        };

        let err = MigrationRunner::new(&cat)
            .run(&mut exec, &mut store)
            .unwrap_err();

        assert!(matches!(err, MigrationError::VersionPersist { version: 2, .. }));
        assert_eq!(err.version(), Some(2));
        assert_eq!(store.version, 1);
        assert!(!exec.log.contains(&"s3a".to_string()));
    }

    #[test]
    fn test_resumes_from_failed_step() {
        let broken = MigrationCatalog::new(vec![
            MigrationStep::new(1, ["s1"]),
            MigrationStep::new(2, ["s2"]),
            MigrationStep::new(3, ["bad"]),
            MigrationStep::new(4, ["s4"]),
        ])
        .unwrap();
        let mut exec = RecordingExecutor {
            fail_on: Some("bad".to_string()),
            ..Default::default()
        };
        let mut store = MemoryStore::default();

        assert!(MigrationRunner::new(&broken)
            .run(&mut exec, &mut store)
            .is_err());
        assert_eq!(store.version, 2);

        let fixed = MigrationCatalog::new(vec![
            MigrationStep::new(1, ["s1"]),
            MigrationStep::new(2, ["s2"]),
            MigrationStep::new(3, ["s3"]),
            MigrationStep::new(4, ["s4"]),
        ])
        .unwrap();
        let mut exec = RecordingExecutor::default();
        let report = MigrationRunner::new(&fixed)
            .run(&mut exec, &mut store)
            .unwrap();

        assert_eq!(report.from_version, 2);
        assert_eq!(report.to_version, 4);
        assert_eq!(exec.log, vec!["begin", "s3", "commit", "begin", "s4", "commit"]);
        assert_eq!(store.history, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_cancel_before_first_step() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore::default();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = MigrationRunner::new(&cat)
            .with_cancel_flag(cancel)
            .run(&mut exec, &mut store)
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.to_version, 0);
        assert!(exec.log.is_empty());
    }

    #[test]
    fn test_cancel_between_steps() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore::default();
        let cancel = CancelFlag::new();

        let trigger = cancel.clone();
        let callback: MigrationProgressCallback = Arc::new(move |p: MigrationProgress| {
            if p == (MigrationProgress::Persisting { version: 1 }) {
                trigger.cancel();
            }
        });

        let report = MigrationRunner::new(&cat)
            .with_cancel_flag(cancel)
            .with_progress(callback)
            .run(&mut exec, &mut store)
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.to_version, 1);
        assert_eq!(store.version, 1);
    }

    #[test]
    fn test_progress_events() {
        let cat = MigrationCatalog::new(vec![MigrationStep::new(1, ["a"])]).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: MigrationProgressCallback = Arc::new(move |p: MigrationProgress| {
            sink.lock().unwrap().push(p);
        });

        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore::default();
        MigrationRunner::new(&cat)
            .with_progress(callback)
            .run(&mut exec, &mut store)
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events[0], MigrationProgress::Checking);
        assert_eq!(
            events[1],
            MigrationProgress::Applying {
                version: 1,
                step: 1,
                total: 1
            }
        );
        assert_eq!(events[2], MigrationProgress::Persisting { version: 1 });
        assert!(matches!(
            events[3],
            MigrationProgress::Complete {
                version: 1,
                steps_applied: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_check_status_and_plan() {
        let cat = catalog();
        let runner = MigrationRunner::new(&cat);

        let mut store = MemoryStore {
            version: 1,
            ..Default::default()
        };
        assert_eq!(
            runner.check_status(&mut store).unwrap(),
            MigrationStatus::Pending {
                from: 1,
                to: 3,
                steps: 2
            }
        );
        let plan = runner.plan(&mut store).unwrap();
        assert_eq!(plan.current_version, 1);
        assert_eq!(plan.target_version, 3);
        assert_eq!(plan.steps.len(), 2);

        store.version = 3;
        assert_eq!(
            runner.check_status(&mut store).unwrap(),
            MigrationStatus::UpToDate { version: 3 }
        );
        assert!(runner.plan(&mut store).unwrap().is_empty());

        store.version = 9;
        assert_eq!(
            runner.check_status(&mut store).unwrap(),
            MigrationStatus::AheadOfCatalog {
                database_version: 9,
                catalog_version: 3
            }
        );
    }

    #[test]
    fn test_database_ahead_of_catalog_is_noop() {
        let cat = catalog();
        let mut exec = RecordingExecutor::default();
        let mut store = MemoryStore {
            version: 9,
            ..Default::default()
        };

        let report = MigrationRunner::new(&cat).run(&mut exec, &mut store).unwrap();
        assert_eq!(report.outcome, RunOutcome::UpToDate);
        assert_eq!(store.version, 9);
        assert!(exec.log.is_empty());
    }

    #[test]
    fn test_sqlite_users_scenario() {
        let conn = Connection::open_in_memory().unwrap();
        let cat = users_catalog();

        let mut exec = SqliteExecutor::new(&conn);
        let mut store = UserVersionStore::new(&conn);
        let report = MigrationRunner::new(&cat).run(&mut exec, &mut store).unwrap();

        assert_eq!(report.to_version, 3);
        assert_eq!(store.get_version().unwrap(), 3);
        assert_eq!(
            columns(&conn, "users"),
            vec!["id", "name", "active", "city", "email"]
        );
    }

    #[test]
    fn test_sqlite_batch_is_atomic() {
        let conn = Connection::open_in_memory().unwrap();
        let cat = MigrationCatalog::new(vec![
            MigrationStep::new(1, ["CREATE TABLE users(id INTEGER PRIMARY KEY, name TEXT NOT NULL)"]),
            MigrationStep::new(
                2,
                [
                    "ALTER TABLE users ADD COLUMN city TEXT",
                    "INSERT INTO users (id, name) VALUES (1, 'ana')",
                    "INSERT INTO users (id, name) VALUES (2, NULL)",
                ],
            ),
        ])
        .unwrap();

        let mut exec = SqliteExecutor::new(&conn);
        let mut store = MetaTableVersionStore::new(&conn);
        let err = MigrationRunner::new(&cat)
            .run(&mut exec, &mut store)
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::StatementExecution {
                version: 2,
                statement_index: 2,
                ..
            }
        ));
        assert_eq!(store.get_version().unwrap(), 1);
        assert_eq!(columns(&conn, "users"), vec!["id", "name"]);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_sqlite_resume_after_fix() {
        let conn = Connection::open_in_memory().unwrap();
        let broken = MigrationCatalog::new(vec![
            MigrationStep::new(1, ["CREATE TABLE users(id INTEGER PRIMARY KEY, name TEXT NOT NULL)"]),
            MigrationStep::new(2, ["ALTER TABLE userz ADD COLUMN city TEXT"]),
        ])
        .unwrap();

        let mut exec = SqliteExecutor::new(&conn);
        let mut store = UserVersionStore::new(&conn);
        assert!(MigrationRunner::new(&broken)
            .run(&mut exec, &mut store)
            .is_err());
        assert_eq!(store.get_version().unwrap(), 1);

        // Step 1 is not re-run: a second CREATE TABLE would fail
        let fixed = MigrationCatalog::new(vec![
            MigrationStep::new(1, ["CREATE TABLE users(id INTEGER PRIMARY KEY, name TEXT NOT NULL)"]),
            MigrationStep::new(2, ["ALTER TABLE users ADD COLUMN city TEXT"]),
        ])
        .unwrap();
        let report = MigrationRunner::new(&fixed)
            .run(&mut exec, &mut store)
            .unwrap();

        assert_eq!(report.from_version, 1);
        assert_eq!(report.to_version, 2);
        assert_eq!(columns(&conn, "users"), vec!["id", "name", "city"]);
    }

    #[test]
    fn test_sqlite_busy_commit_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.sqlite3");

        // Rollback journal, so an open reader blocks the migration's COMMIT
        let conn = Connection::open(&path).unwrap();
        conn.busy_timeout(Duration::ZERO).unwrap();

        let reader = Connection::open(&path).unwrap();
        reader.execute_batch("BEGIN").unwrap();
        let seen: i64 = reader
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(seen, 0);

        let cat = users_catalog();
        let mut exec = SqliteExecutor::new(&conn);
        let mut store = UserVersionStore::new(&conn);
        let err = MigrationRunner::new(&cat)
            .run(&mut exec, &mut store)
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::StatementExecution {
                version: 1,
                statement_index: 1,
                ..
            }
        ));
        assert!(conn.is_autocommit());
        assert_eq!(store.get_version().unwrap(), 0);
        assert!(columns(&conn, "users").is_empty());

        reader.execute_batch("COMMIT").unwrap();

        let report = MigrationRunner::new(&cat).run(&mut exec, &mut store).unwrap();
        assert_eq!(report.from_version, 0);
        assert_eq!(report.to_version, 3);
        assert_eq!(
            columns(&conn, "users"),
            vec!["id", "name", "active", "city", "email"]
        );
    }

    #[test]
    fn test_version_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cat = users_catalog();

        for kind in [VersionStoreKind::UserVersion, VersionStoreKind::MetaTable] {
            let path = dir.path().join(format!("{}.sqlite3", kind));
            let path = path.to_str().unwrap();

            {
                let db = DatabaseConn::open_path(path).unwrap();
                let mut exec = SqliteExecutor::new(&db.conn);
                let mut store = open_version_store(kind, &db.conn);
                let report = MigrationRunner::new(&cat)
                    .run(&mut exec, store.as_mut())
                    .unwrap();
                assert_eq!(report.to_version, 3);
            }

            let db = DatabaseConn::open_path(path).unwrap();
            let mut exec = RecordingExecutor::default();
            let mut store = open_version_store(kind, &db.conn);
            assert_eq!(store.get_version().unwrap(), 3);

            let report = MigrationRunner::new(&cat)
                .run(&mut exec, store.as_mut())
                .unwrap();
            assert_eq!(report.outcome, RunOutcome::UpToDate);
            assert_eq!(report.from_version, 3);
            assert!(report.applied.is_empty());
            assert!(exec.log.is_empty());
            assert_eq!(
                db.table_columns("users").unwrap(),
                vec!["id", "name", "active", "city", "email"]
            );
        }
    }
}
