//! Statement execution
//!
//! The runner hands raw statement text to a [`StatementExecutor`] and groups
//! each batch in a unit of work. [`UnitOfWork`] is the scoped handle for one
//! such group: it rolls back on drop unless it was committed.

use super::error::ExecError;
use rusqlite::Connection;
use tracing::{debug, warn};

/// Runs raw statements against a database, grouped in atomic units
///
/// Implementations must guarantee that after `rollback_unit` none of the
/// statements executed since the matching `begin_unit` have any observable
/// effect.
pub trait StatementExecutor {
    fn begin_unit(&mut self) -> Result<(), ExecError>;

    fn execute(&mut self, statement: &str) -> Result<(), ExecError>;

    fn commit_unit(&mut self) -> Result<(), ExecError>;

    fn rollback_unit(&mut self) -> Result<(), ExecError>;
}

/// An open unit of work on an executor
///
/// Dropping the guard without calling [`commit`](Self::commit) rolls the unit
/// back.
pub struct UnitOfWork<'e, E: StatementExecutor + ?Sized> {
    executor: &'e mut E,
    open: bool,
}

impl<'e, E: StatementExecutor + ?Sized> UnitOfWork<'e, E> {
    /// Begin a unit of work on `executor`
    pub fn begin(executor: &'e mut E) -> Result<Self, ExecError> {
        executor.begin_unit()?;
        Ok(Self {
            executor,
            open: true,
        })
    }

    pub fn execute(&mut self, statement: &str) -> Result<(), ExecError> {
        self.executor.execute(statement)
    }

    /// Commit the unit
    ///
    /// A failed commit leaves the guard open, so dropping it rolls back
    /// whatever the executor still holds.
    pub fn commit(mut self) -> Result<(), ExecError> {
        self.executor.commit_unit()?;
        self.open = false;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), ExecError> {
        self.open = false;
        self.executor.rollback_unit()
    }
}

impl<E: StatementExecutor + ?Sized> Drop for UnitOfWork<'_, E> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.executor.rollback_unit() {
                warn!("Failed to roll back abandoned unit of work: {}", e);
            }
        }
    }
}

/// SQLite statement executor
///
/// Units of work map to `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK`, so a batch
/// takes the write lock up front instead of failing midway on a busy
/// database. Statements go through `execute_batch`, which accepts trailing
/// semicolons and leading whitespace as catalog authors tend to write them.
pub struct SqliteExecutor<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteExecutor<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl StatementExecutor for SqliteExecutor<'_> {
    fn begin_unit(&mut self) -> Result<(), ExecError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn execute(&mut self, statement: &str) -> Result<(), ExecError> {
        debug!("Executing: {}", statement.trim());
        self.conn.execute_batch(statement)?;
        Ok(())
    }

    fn commit_unit(&mut self) -> Result<(), ExecError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_unit(&mut self) -> Result<(), ExecError> {
        // A failed COMMIT may already have ended the transaction
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
