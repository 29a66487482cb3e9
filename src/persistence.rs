//! Transactional save wrapper
//!
//! Every write runs inside its own nested level (a transaction, or a
//! savepoint when the caller already opened one). A constraint violation
//! rolls that level back and goes to the dispatcher; a claimed violation
//! comes back as [`RecordInvalid`], anything else comes back untouched.

use tracing::{debug, warn};

use crate::db::Session;
use crate::dispatcher;
use crate::error::{DbResult, RecordInvalid, SaveError, SaveResult};
use crate::model::{Model, Record};

/// Where a guarded write is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    InTransaction,
    Committed,
    RolledBack,
}

/// Options of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Run the query-free pre-checks. Violations reported by the database
    /// are translated either way.
    pub validate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

impl SaveOptions {
    pub fn skip_validation() -> Self {
        Self { validate: false }
    }
}

/// Wraps one write for one model
#[derive(Debug)]
pub struct SaveGuard<'m> {
    model: &'m Model,
    state: SaveState,
}

impl<'m> SaveGuard<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            state: SaveState::Idle,
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    /// Run `write` in a nested level and translate its constraint
    /// violations onto `record`.
    ///
    /// # Errors
    /// `SaveError::Invalid` when a registered rule claimed the violation,
    /// `SaveError::Database` with the original error otherwise
    pub async fn run<S, T, F>(&mut self, session: &mut S, record: &mut dyn Record, write: F) -> SaveResult<T>
    where
        S: Session,
        F: AsyncFnOnce(&mut S) -> DbResult<T>,
    {
        session.begin_nested().await?;
        self.state = SaveState::InTransaction;

        let error = match write(&mut *session).await {
            Ok(value) => match session.commit_nested().await {
                Ok(()) => {
                    self.state = SaveState::Committed;
                    debug!(model = self.model.name(), "save committed");
                    return Ok(value);
                }
                // The level is closed even when the commit fails
                Err(e) => e,
            },
            Err(e) => {
                if let Err(rollback) = session.rollback_nested().await {
                    warn!(model = self.model.name(), error = %rollback, "rollback after failed write failed");
                }
                e
            }
        };
        self.state = SaveState::RolledBack;

        if error.is_constraint_violation() && dispatcher::handle(self.model, record, &error) {
            debug!(model = self.model.name(), "constraint violation translated");
            return Err(RecordInvalid::new(record.errors().clone()).into());
        }

        debug!(model = self.model.name(), error = %error, "save rolled back");
        Err(SaveError::Database(error))
    }
}

/// Insert `record` with default options
///
/// # Errors
/// See [`save_with`]
pub async fn save<S: Session>(model: &Model, session: &mut S, record: &mut dyn Record) -> SaveResult<()> {
    save_with(model, session, record, SaveOptions::default()).await
}

/// Insert `record`.
///
/// With `validate` on, presence rules are pre-checked without querying:
/// a record whose foreign key column and association are both empty, or
/// whose required attribute is blank, fails before anything is written.
/// Uniqueness is always left to the database.
///
/// # Errors
/// `SaveError::Invalid` for pre-check failures and translated violations,
/// `SaveError::Database` for everything else
pub async fn save_with<S: Session>(
    model: &Model,
    session: &mut S,
    record: &mut dyn Record,
    options: SaveOptions,
) -> SaveResult<()> {
    record.errors_mut().clear();

    if options.validate {
        for rule in model.chain().presence_rules() {
            if rule.is_missing(record) {
                record.errors_mut().add(rule.error());
            }
        }
        if !record.errors().is_empty() {
            return Err(RecordInvalid::new(record.errors().clone()).into());
        }
    }

    let table = model.table_name().to_string();
    let values = record.attributes();
    SaveGuard::new(model)
        .run(session, record, async move |s: &mut S| s.insert(&table, &values).await)
        .await?;
    Ok(())
}
