//! Database-backed uniqueness rules

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::adapters::UniquenessOption;
use crate::db::schema::{Index, IndexColumns};
use crate::model::errors::{ErrorDetail, ErrorKind};
use crate::model::record::Record;
use crate::registry::key::{ConstraintKey, unify_columns};

/// Predicate over a record, used for `if`/`unless`
pub type RecordPredicate = Arc<dyn Fn(&dyn Record) -> bool + Send + Sync>;

/// Options of a uniqueness declaration
#[derive(Clone, Default)]
pub struct UniquenessOptions {
    scope: Vec<String>,
    message: Option<String>,
    where_clause: Option<String>,
    index_name: Option<String>,
    case_sensitive: Option<bool>,
    when: Option<RecordPredicate>,
    unless: Option<RecordPredicate>,
}

impl UniquenessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns the value must be unique within
    pub fn scope<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.scope
            .extend(columns.iter().map(|c| c.as_ref().to_string()));
        self
    }

    /// Replaces the default "has already been taken"
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Partial-index predicate
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    /// Resolve the backing index by name instead of by columns
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = Some(case_sensitive);
        self
    }

    /// Only check in-process when the predicate holds (`if`)
    pub fn when(mut self, predicate: impl Fn(&dyn Record) -> bool + Send + Sync + 'static) -> Self {
        self.when = Some(Arc::new(predicate));
        self
    }

    /// Skip the in-process check when the predicate holds
    pub fn unless(mut self, predicate: impl Fn(&dyn Record) -> bool + Send + Sync + 'static) -> Self {
        self.unless = Some(Arc::new(predicate));
        self
    }

    /// Options set on this declaration, in declaration-check order
    pub fn provided(&self) -> Vec<UniquenessOption> {
        let mut provided = Vec::new();
        if !self.scope.is_empty() {
            provided.push(UniquenessOption::Scope);
        }
        if self.message.is_some() {
            provided.push(UniquenessOption::Message);
        }
        if self.where_clause.is_some() {
            provided.push(UniquenessOption::Where);
        }
        if self.when.is_some() {
            provided.push(UniquenessOption::If);
        }
        if self.unless.is_some() {
            provided.push(UniquenessOption::Unless);
        }
        if self.index_name.is_some() {
            provided.push(UniquenessOption::IndexName);
        }
        if self.case_sensitive.is_some() {
            provided.push(UniquenessOption::CaseSensitive);
        }
        provided
    }

    pub(crate) fn index_name_ref(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    pub(crate) fn where_clause_ref(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    pub(crate) fn scope_ref(&self) -> &[String] {
        &self.scope
    }
}

impl fmt::Debug for UniquenessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniquenessOptions")
            .field("scope", &self.scope)
            .field("message", &self.message)
            .field("where_clause", &self.where_clause)
            .field("index_name", &self.index_name)
            .field("case_sensitive", &self.case_sensitive)
            .field("if", &self.when.is_some())
            .field("unless", &self.unless.is_some())
            .finish()
    }
}

/// A registered uniqueness rule for one attribute
#[derive(Clone)]
pub struct UniquenessRule {
    attribute: String,
    scope: Vec<String>,
    columns: Vec<String>,
    message: Option<String>,
    where_clause: Option<String>,
    index_name: Option<String>,
    backing_index: Option<String>,
    index_columns: Option<Vec<String>>,
    case_sensitive: bool,
    when: Option<RecordPredicate>,
    unless: Option<RecordPredicate>,
}

impl UniquenessRule {
    /// Build the rule for `attribute`; `backing_index` is the resolved
    /// index, absent when the existence check was skipped and failed.
    pub(crate) fn new(attribute: &str, options: &UniquenessOptions, backing_index: Option<&Index>) -> Self {
        let mut columns = vec![attribute.to_string()];
        columns.extend(options.scope.iter().cloned());
        let index_columns = backing_index.and_then(|index| match &index.columns {
            IndexColumns::Columns(cols) => Some(unify_columns(cols)),
            IndexColumns::Expression(_) => None,
        });

        Self {
            attribute: attribute.to_string(),
            scope: options.scope.clone(),
            columns: unify_columns(&columns),
            message: options.message.clone(),
            where_clause: options.where_clause.clone(),
            index_name: options.index_name.clone(),
            backing_index: backing_index.map(|index| index.name.clone()),
            index_columns,
            case_sensitive: options.case_sensitive.unwrap_or(true),
            when: options.when.clone(),
            unless: options.unless.clone(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// `{attribute} ∪ scope`, sorted
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    /// Explicitly requested index name
    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    /// Name of the index backing this rule, when one was resolved
    pub fn backing_index(&self) -> Option<&str> {
        self.index_name.as_deref().or(self.backing_index.as_deref())
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Keys this rule answers to: its column set as declared and as the
    /// index spells it, plus its index name
    pub fn keys(&self) -> Vec<ConstraintKey> {
        let mut keys = vec![ConstraintKey::uniqueness(&self.columns)];
        let index_columns = self.index_columns.as_deref();
        if let Some(columns) = index_columns.filter(|c| *c != self.columns.as_slice()) {
            keys.push(ConstraintKey::uniqueness(columns));
        }
        if let Some(name) = self.backing_index() {
            keys.push(ConstraintKey::unique_index(name));
        }
        keys
    }

    /// Whether the `if`/`unless` conditions let the in-process check run
    pub fn conditions_pass(&self, record: &dyn Record) -> bool {
        self.when.as_ref().is_none_or(|f| f(record)) && !self.unless.as_ref().is_some_and(|f| f(record))
    }

    /// Attach a "taken" error carrying the offending value
    pub fn apply_error(&self, record: &mut dyn Record) {
        let value = record.attribute(&self.attribute);
        debug!(attribute = %self.attribute, value = %value, "uniqueness violation");
        record.errors_mut().add(
            ErrorDetail::new(&self.attribute, ErrorKind::Taken)
                .with_message(self.message.clone())
                .with_value(value),
        );
    }
}

impl fmt::Debug for UniquenessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniquenessRule")
            .field("attribute", &self.attribute)
            .field("scope", &self.scope)
            .field("message", &self.message)
            .field("where_clause", &self.where_clause)
            .field("index_name", &self.backing_index())
            .field("case_sensitive", &self.case_sensitive)
            .finish()
    }
}
