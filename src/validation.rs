//! In-process validation
//!
//! The query-based check callers run when they ask whether a record is
//! valid before saving it. Saves never depend on it: the database is the
//! authority, this only reports early.

use tracing::debug;

use crate::db::{ExistsQuery, Session};
use crate::error::DbResult;
use crate::model::{Association, Model, Record};
use crate::registry::{PresenceKind, PresenceRule, UniquenessRule};

/// Validate `record` against every rule of `model`.
///
/// Clears previous errors. Returns whether the record is valid.
///
/// # Errors
/// Returns `DbError` if an existence query fails
pub async fn validate<S: Session>(model: &Model, session: &mut S, record: &mut dyn Record) -> DbResult<bool> {
    record.errors_mut().clear();

    for rule in model.chain().uniqueness_rules() {
        if rule.conditions_pass(record) && value_taken(model, session, rule, record).await? {
            rule.apply_error(record);
        }
    }

    for rule in model.chain().presence_rules() {
        if !presence_satisfied(session, rule, record).await? {
            record.errors_mut().add(rule.error());
        }
    }

    debug!(model = model.name(), errors = record.errors().len(), "validated");
    Ok(record.errors().is_empty())
}

/// Whether another row already holds the record's value.
///
/// Null values are exempt, blank ones are not.
async fn value_taken<S: Session>(
    model: &Model,
    session: &mut S,
    rule: &UniquenessRule,
    record: &dyn Record,
) -> DbResult<bool> {
    let value = record.attribute(rule.attribute());
    if value.is_null() {
        return Ok(false);
    }

    let mut query = ExistsQuery::new(model.table_name())
        .condition(rule.attribute(), value, rule.case_sensitive())
        .where_clause(rule.where_clause().map(str::to_string))
        .exclude(model.primary_key(), record.attribute(model.primary_key()));
    for column in rule.scope() {
        query = query.condition(column, record.attribute(column), true);
    }

    session.exists(&query).await
}

async fn presence_satisfied<S: Session>(
    session: &mut S,
    rule: &PresenceRule,
    record: &dyn Record,
) -> DbResult<bool> {
    if rule.kind() == PresenceKind::Attribute {
        return Ok(!rule.is_missing(record));
    }

    match record.association(rule.relation()) {
        Association::Loaded(_) => Ok(true),
        Association::Absent => Ok(false),
        Association::NotLoaded => {
            let id = record.attribute(rule.column());
            if id.is_null() {
                return Ok(false);
            }
            if rule.kind() == PresenceKind::Association {
                return Ok(true);
            }
            match rule.foreign_key() {
                Some(fk) => {
                    let query = ExistsQuery::new(&fk.to_table).condition(&fk.primary_key, id, true);
                    session.exists(&query).await
                }
                // Unresolved foreign key: nothing to look the parent up in
                None => Ok(true),
            }
        }
    }
}
