//! Test-support matcher over a model's uniqueness rules
//!
//! ```ignore
//! assert!(validate_db_uniqueness_of("field").scoped_to(&["company_id"]).matches(&model));
//! ```

use crate::model::Model;
use crate::registry::UniquenessRule;

/// Expected shape of a uniqueness rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquenessMatcher {
    field: String,
    scope: Vec<String>,
    message: Option<String>,
    where_clause: Option<String>,
    index_name: Option<String>,
    case_sensitive: bool,
}

/// Start a matcher for a uniqueness rule on `field`
pub fn validate_db_uniqueness_of(field: &str) -> UniquenessMatcher {
    UniquenessMatcher {
        field: field.to_string(),
        scope: Vec::new(),
        message: None,
        where_clause: None,
        index_name: None,
        case_sensitive: true,
    }
}

impl UniquenessMatcher {
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn scoped_to(mut self, scope: &[&str]) -> Self {
        self.scope = scope.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_where(mut self, where_clause: &str) -> Self {
        self.where_clause = Some(where_clause.to_string());
        self
    }

    pub fn with_index(mut self, index_name: &str) -> Self {
        self.index_name = Some(index_name.to_string());
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Whether the model, or one of its ancestors, declares exactly this rule
    pub fn matches(&self, model: &Model) -> bool {
        model.chain().uniqueness_rules().into_iter().any(|rule| self.matches_rule(rule))
    }

    fn matches_rule(&self, rule: &UniquenessRule) -> bool {
        rule.attribute() == self.field
            && rule.scope() == self.scope.as_slice()
            && rule.message() == self.message.as_deref()
            && rule.where_clause() == self.where_clause.as_deref()
            && rule.index_name() == self.index_name.as_deref()
            && rule.case_sensitive() == self.case_sensitive
    }

    pub fn description(&self) -> String {
        let mut desc = format!("validate database uniqueness of {}. ", self.field);
        if self.message.is_some() || !self.scope.is_empty() || self.where_clause.is_some() {
            desc.push_str("With options - ");
        }
        if let Some(message) = &self.message {
            desc.push_str(&format!("message: '{}'; ", message));
        }
        if !self.scope.is_empty() {
            desc.push_str(&format!("scope: {:?}; ", self.scope));
        }
        if let Some(where_clause) = &self.where_clause {
            desc.push_str(&format!("where: '{}'; ", where_clause));
        }
        if let Some(index_name) = &self.index_name {
            desc.push_str(&format!("index_name: '{}'; ", index_name));
        }
        if !self.case_sensitive {
            desc.push_str("be case insensitive.");
        }
        desc
    }

    /// Lists every uniqueness rule the model has
    pub fn failure_message(&self, model: &Model) -> String {
        let available: Vec<String> = model
            .chain()
            .uniqueness_rules()
            .into_iter()
            .map(|rule| format!("{:?}", rule))
            .collect();
        format!(
            "There is no such database uniqueness validator. Available validators are: [{}].",
            available.join(", ")
        )
    }
}
