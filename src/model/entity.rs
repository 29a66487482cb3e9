//! A ready-made record

use std::collections::HashMap;

use crate::db::Value;
use crate::model::errors::Errors;
use crate::model::record::{Association, Record};

/// Generic record with ordered attributes
#[derive(Debug, Clone, Default)]
pub struct Entity {
    attributes: Vec<(String, Value)>,
    associations: HashMap<String, Association>,
    errors: Errors,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::set_attribute`]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value.into());
        self
    }

    /// Builder form of [`Record::set_association`]
    pub fn with_association(mut self, name: &str, association: Association) -> Self {
        self.set_association(name, association);
        self
    }
}

impl Record for Entity {
    fn attribute(&self, name: &str) -> Value {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    fn set_attribute(&mut self, name: &str, value: Value) {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    fn association(&self, name: &str) -> Association {
        self.associations.get(name).cloned().unwrap_or_default()
    }

    fn set_association(&mut self, name: &str, association: Association) {
        self.associations.insert(name.to_string(), association);
    }

    fn errors(&self) -> &Errors {
        &self.errors
    }

    fn errors_mut(&mut self) -> &mut Errors {
        &mut self.errors
    }

    fn attributes(&self) -> Vec<(String, Value)> {
        self.attributes.clone()
    }
}
