//! Violation dispatcher
//!
//! Turns a constraint violation reported by the database into a field error
//! on the record, when one of the model's rules claims it. Anything not
//! claimed is left for the caller to propagate unchanged.

use tracing::debug;

use crate::error::DbError;
use crate::model::{Model, Record};
use crate::registry::{ConstraintKey, ConstraintRule};

/// Translate `error` onto `record`.
///
/// Returns `true` when a rule matched and its error was attached.
pub fn handle(model: &Model, record: &mut dyn Record, error: &DbError) -> bool {
    match error {
        DbError::UniqueViolation { message } => handle_unique(model, record, message),
        DbError::ForeignKeyViolation { message } => handle_foreign_key(model, record, message),
        _ => false,
    }
}

fn handle_unique(model: &Model, record: &mut dyn Record, message: &str) -> bool {
    let violation = model.adapter().parse_unique_violation(message);

    let mut keys = Vec::with_capacity(2);
    if let Some(name) = violation.index_name.as_deref() {
        keys.push(ConstraintKey::unique_index(name));
    }
    if !violation.columns.is_empty() {
        keys.push(ConstraintKey::uniqueness(&violation.columns));
    }

    match model.chain().lookup(&keys).and_then(ConstraintRule::as_uniqueness) {
        Some(rule) => {
            rule.apply_error(record);
            true
        }
        None => {
            debug!(
                model = model.name(),
                index = ?violation.index_name,
                columns = ?violation.columns,
                "unique violation not claimed by any rule"
            );
            false
        }
    }
}

fn handle_foreign_key(model: &Model, record: &mut dyn Record, message: &str) -> bool {
    let Some(column) = model.adapter().parse_foreign_key_violation(message) else {
        debug!(model = model.name(), "foreign key violation without a column");
        return false;
    };

    let keys = [ConstraintKey::presence(&column)];
    match model.chain().lookup(&keys).and_then(ConstraintRule::as_presence) {
        Some(rule) => {
            rule.apply_error(record);
            true
        }
        None => {
            debug!(model = model.name(), column = %column, "foreign key violation not claimed by any rule");
            false
        }
    }
}
