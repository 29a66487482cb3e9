//! The record seam
//!
//! Hosts keep their own attribute and association machinery; validations
//! only need to read and write values by name and to reach the error
//! collection.

use crate::db::Value;
use crate::model::errors::Errors;

/// State of a belongs-to association on a record
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Association {
    /// Never read; the foreign key column is authoritative
    #[default]
    NotLoaded,
    /// Known to be empty
    Absent,
    /// Loaded parent, identified by its primary key
    Loaded(Value),
}

impl Association {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Association::Loaded(_))
    }
}

/// A persistable record
pub trait Record: Send {
    /// Current value of an attribute, `Value::Null` when unset
    fn attribute(&self, name: &str) -> Value;

    fn set_attribute(&mut self, name: &str, value: Value);

    fn association(&self, name: &str) -> Association;

    fn set_association(&mut self, name: &str, association: Association);

    fn errors(&self) -> &Errors;

    fn errors_mut(&mut self) -> &mut Errors;

    /// Column/value pairs to write, in column order
    fn attributes(&self) -> Vec<(String, Value)>;
}
