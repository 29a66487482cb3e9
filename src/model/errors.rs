//! Field-level validation errors attached to a record

use serde::Serialize;
use std::fmt;

use crate::db::Value;

/// Kind of a field error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Another row already holds the value
    Taken,
    /// A required association is missing
    Required,
    /// A required value is blank
    Blank,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Taken => "taken",
            ErrorKind::Required => "required",
            ErrorKind::Blank => "blank",
        }
    }

    /// Default phrase used in full messages
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Taken => "has already been taken",
            ErrorKind::Required => "must exist",
            ErrorKind::Blank => "can't be blank",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error on one attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub attribute: String,
    #[serde(rename = "error")]
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ErrorDetail {
    pub fn new(attribute: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            attribute: attribute.into(),
            kind,
            message: None,
            value: None,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Custom message, or the kind's default phrase
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(self.kind.default_message())
    }

    /// `Field has already been taken`
    pub fn full_message(&self) -> String {
        format!("{} {}", humanize(&self.attribute), self.message())
    }
}

/// Ordered error collection of one record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Errors {
    details: Vec<ErrorDetail>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, detail: ErrorDetail) {
        self.details.push(detail);
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    pub fn len(&self) -> usize {
        self.details.len()
    }

    pub fn clear(&mut self) {
        self.details.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorDetail> {
        self.details.iter()
    }

    /// Errors on one attribute
    pub fn on(&self, attribute: &str) -> Vec<&ErrorDetail> {
        self.details.iter().filter(|d| d.attribute == attribute).collect()
    }

    /// Whether `attribute` has an error of `kind`
    pub fn added(&self, attribute: &str, kind: ErrorKind) -> bool {
        self.details
            .iter()
            .any(|d| d.attribute == attribute && d.kind == kind)
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.details.iter().map(ErrorDetail::full_message).collect()
    }

    /// Details as a JSON array, e.g. for an API error body
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// `company_id` -> `Company`, `field_1` -> `Field 1`
fn humanize(attribute: &str) -> String {
    let name = attribute.strip_suffix("_id").unwrap_or(attribute).replace('_', " ");
    let mut chars = name.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
