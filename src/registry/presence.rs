//! Database-backed presence rules
//!
//! Declared through `db_belongs_to` or `validates_db_presence_of`. Every
//! variant is keyed by the column a foreign key violation would name.

use tracing::debug;

use crate::db::Value;
use crate::db::schema::ForeignKey;
use crate::model::errors::{ErrorDetail, ErrorKind};
use crate::model::record::{Association, Record};
use crate::registry::key::ConstraintKey;

/// How a presence rule was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    /// `db_belongs_to`; `validate` looks the parent row up
    BelongsTo,
    /// Association named in `validates_db_presence_of`; a set foreign key
    /// is trusted
    Association,
    /// Plain column named in `validates_db_presence_of`
    Attribute,
}

/// A registered presence rule
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRule {
    kind: PresenceKind,
    relation: String,
    column: String,
    foreign_key: Option<ForeignKey>,
}

impl PresenceRule {
    pub(crate) fn new(relation: &str, column: &str, foreign_key: Option<ForeignKey>) -> Self {
        Self::with_kind(PresenceKind::BelongsTo, relation, column, foreign_key)
    }

    pub(crate) fn with_kind(
        kind: PresenceKind,
        relation: &str,
        column: &str,
        foreign_key: Option<ForeignKey>,
    ) -> Self {
        Self {
            kind,
            relation: relation.to_string(),
            column: column.to_string(),
            foreign_key,
        }
    }

    /// Plain attribute rule; the attribute is its own column
    pub(crate) fn attribute(column: &str) -> Self {
        Self::with_kind(PresenceKind::Attribute, column, column, None)
    }

    pub fn kind(&self) -> PresenceKind {
        self.kind
    }

    /// Whether the rule covers an association rather than a plain column
    pub fn is_association(&self) -> bool {
        self.kind != PresenceKind::Attribute
    }

    /// Association name, e.g. `company`; the column itself for attributes
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Foreign key column, e.g. `company_id`
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Resolved constraint, absent when the existence check was skipped
    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        self.foreign_key.as_ref()
    }

    pub fn keys(&self) -> Vec<ConstraintKey> {
        vec![ConstraintKey::presence(&self.column)]
    }

    /// Invalid only when both the raw column and the association are empty;
    /// a plain attribute is invalid when blank.
    ///
    /// Never loads anything: a set column is trusted until the database
    /// says otherwise.
    pub fn is_missing(&self, record: &dyn Record) -> bool {
        match self.kind {
            PresenceKind::Attribute => record.attribute(&self.column).is_blank(),
            PresenceKind::BelongsTo | PresenceKind::Association => {
                record.attribute(&self.column).is_null()
                    && !record.association(&self.relation).is_loaded()
            }
        }
    }

    /// Error attached when the rule fails: "must exist" on the association,
    /// "can't be blank" on a plain attribute
    pub fn error(&self) -> ErrorDetail {
        match self.kind {
            PresenceKind::Attribute => ErrorDetail::new(&self.column, ErrorKind::Blank),
            PresenceKind::BelongsTo | PresenceKind::Association => {
                ErrorDetail::new(&self.relation, ErrorKind::Required)
            }
        }
    }

    /// Clear the offending value and attach the rule's error.
    ///
    /// Associations are marked known-absent so nothing reloads them.
    pub fn apply_error(&self, record: &mut dyn Record) {
        debug!(relation = %self.relation, column = %self.column, "foreign key violation");
        if self.is_association() {
            record.set_association(&self.relation, Association::Absent);
        }
        record.set_attribute(&self.column, Value::Null);
        record.errors_mut().add(self.error());
    }
}
