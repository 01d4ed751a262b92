//! Database handle abstraction used by the schema linker.
//!
//! A [`Database`] hands out short-lived [`Session`]s; each session is one
//! transaction that is either committed or rolled back before the next step
//! begins. [`scoped`] is the single place that implements that contract.

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::{
    frame::Frame,
    sql::{Statement, TableDef},
};

pub trait Database {
    /// Opens a new transactional session.
    fn session(&self) -> Result<Box<dyn Session + '_>>;
}

pub trait Session {
    fn execute(&mut self, statement: &Statement) -> Result<()>;

    /// Bulk-inserts every row of `frame` into `table`. Frame columns must be
    /// in the same order as the table definition.
    fn insert(&mut self, table: &TableDef, frame: &Frame) -> Result<u64>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Runs `step` inside a fresh session. The session is committed when the step
/// succeeds and rolled back otherwise; the step's error is returned with
/// `description` attached.
pub fn scoped<T, F>(database: &dyn Database, description: &str, step: F) -> Result<T>
where
    F: FnOnce(&mut dyn Session) -> Result<T>,
{
    debug!("Begin: {description}");
    let mut session = database
        .session()
        .with_context(|| format!("Opening session for {description}"))?;
    match step(session.as_mut()) {
        Ok(value) => {
            session
                .commit()
                .with_context(|| format!("Committing {description}"))?;
            debug!("Committed: {description}");
            Ok(value)
        }
        Err(err) => {
            warn!("Rolling back {description}: {err:#}");
            if let Err(rollback_err) = session.rollback() {
                warn!("Rollback of {description} failed: {rollback_err:#}");
            }
            Err(err.context(description.to_string()))
        }
    }
}

pub(crate) fn ensure_aligned(table: &TableDef, frame: &Frame) -> Result<()> {
    let expected = table.column_names();
    let actual = frame.headers();
    anyhow::ensure!(
        expected == actual,
        "Frame columns {actual:?} do not match table `{}` columns {expected:?}",
        table.name
    );
    Ok(())
}
