//! Constraint registry and rule declarations
//!
//! Rules are declared once while a model is defined. Each declaration is
//! checked against the introspected schema, then stored under every key a
//! violation message could later produce for it.

pub mod key;
pub mod presence;
pub mod uniqueness;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapters::SchemaAdapter;
use crate::config::Settings;
use crate::db::schema::Index;
use crate::error::{ConfigError, ConfigResult};

pub use key::ConstraintKey;
pub use presence::{PresenceKind, PresenceRule};
pub use uniqueness::{RecordPredicate, UniquenessOptions, UniquenessRule};

/// A registered rule
#[derive(Debug, Clone)]
pub enum ConstraintRule {
    Uniqueness(UniquenessRule),
    Presence(PresenceRule),
}

impl ConstraintRule {
    pub fn keys(&self) -> Vec<ConstraintKey> {
        match self {
            ConstraintRule::Uniqueness(rule) => rule.keys(),
            ConstraintRule::Presence(rule) => rule.keys(),
        }
    }

    pub fn as_uniqueness(&self) -> Option<&UniquenessRule> {
        match self {
            ConstraintRule::Uniqueness(rule) => Some(rule),
            ConstraintRule::Presence(_) => None,
        }
    }

    pub fn as_presence(&self) -> Option<&PresenceRule> {
        match self {
            ConstraintRule::Presence(rule) => Some(rule),
            ConstraintRule::Uniqueness(_) => None,
        }
    }
}

/// Rules declared directly on one model
#[derive(Debug, Default)]
pub struct ConstraintRegistry {
    rules: Vec<Arc<ConstraintRule>>,
    keys: HashMap<ConstraintKey, Arc<ConstraintRule>>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a rule under all of its keys
    ///
    /// # Errors
    /// Returns `ConfigError::DuplicateRule` if another rule already owns one
    /// of the keys
    pub fn register(&mut self, rule: ConstraintRule) -> ConfigResult<()> {
        let keys = rule.keys();
        if let Some(taken) = keys.iter().find(|k| self.keys.contains_key(*k)) {
            return Err(ConfigError::DuplicateRule {
                key: taken.to_string(),
            });
        }

        let rule = Arc::new(rule);
        for key in keys {
            self.keys.insert(key, Arc::clone(&rule));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn get(&self, key: &ConstraintKey) -> Option<&ConstraintRule> {
        self.keys.get(key).map(Arc::as_ref)
    }

    /// Rules in declaration order
    pub fn rules(&self) -> impl Iterator<Item = &ConstraintRule> {
        self.rules.iter().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A model's own registry followed by its ancestors', most derived first
#[derive(Debug, Clone, Default)]
pub struct RegistryChain {
    registries: Vec<Arc<ConstraintRegistry>>,
}

impl RegistryChain {
    pub fn root(registry: ConstraintRegistry) -> Self {
        Self {
            registries: vec![Arc::new(registry)],
        }
    }

    /// Chain for a derived model: `[own, parent...]`
    pub fn derive(registry: ConstraintRegistry, parent: &RegistryChain) -> Self {
        let mut registries = Vec::with_capacity(parent.registries.len() + 1);
        registries.push(Arc::new(registry));
        registries.extend(parent.registries.iter().cloned());
        Self { registries }
    }

    /// First rule answering to any of `keys`, searching own rules before
    /// ancestors and trying the keys in order within each registry
    pub fn lookup(&self, keys: &[ConstraintKey]) -> Option<&ConstraintRule> {
        self.registries
            .iter()
            .find_map(|registry| keys.iter().find_map(|key| registry.get(key)))
    }

    /// Every rule in effect, root model's first.
    ///
    /// An ancestor rule whose keys are all claimed by a more derived model
    /// is shadowed and left out.
    pub fn rules(&self) -> Vec<&ConstraintRule> {
        let mut claimed: HashSet<ConstraintKey> = HashSet::new();
        let mut levels = Vec::with_capacity(self.registries.len());

        for registry in &self.registries {
            let visible: Vec<&ConstraintRule> = registry
                .rules()
                .filter(|rule| !rule.keys().iter().all(|k| claimed.contains(k)))
                .collect();
            claimed.extend(registry.rules().flat_map(ConstraintRule::keys));
            levels.push(visible);
        }

        levels.into_iter().rev().flatten().collect()
    }

    pub fn uniqueness_rules(&self) -> Vec<&UniquenessRule> {
        self.rules()
            .into_iter()
            .filter_map(ConstraintRule::as_uniqueness)
            .collect()
    }

    pub fn presence_rules(&self) -> Vec<&PresenceRule> {
        self.rules()
            .into_iter()
            .filter_map(ConstraintRule::as_presence)
            .collect()
    }

    /// Number of registries, the model's own included
    pub fn depth(&self) -> usize {
        self.registries.len()
    }
}

/// Declaration entry points handed to a model definition
pub struct Declarations<'a> {
    model: &'a str,
    adapter: &'a SchemaAdapter,
    settings: &'a Settings,
    registry: ConstraintRegistry,
}

impl<'a> Declarations<'a> {
    pub(crate) fn new(model: &'a str, adapter: &'a SchemaAdapter, settings: &'a Settings) -> Self {
        Self {
            model,
            adapter,
            settings,
            registry: ConstraintRegistry::new(),
        }
    }

    pub(crate) fn finish(self) -> ConstraintRegistry {
        self.registry
    }

    /// Declare database-backed uniqueness of each attribute
    ///
    /// # Errors
    /// Returns `ConfigError` when an option is unsupported by the engine,
    /// when `index_name` is combined with several attributes, or when no
    /// unique index backs an attribute and the check is not skipped
    pub fn validates_db_uniqueness_of(
        &mut self,
        attributes: &[&str],
        options: UniquenessOptions,
    ) -> ConfigResult<()> {
        self.check_options(&options)?;

        if attributes.is_empty() {
            return Err(ConfigError::Invalid(
                "validates_db_uniqueness_of needs at least one attribute".to_string(),
            ));
        }
        if options.index_name_ref().is_some() && attributes.len() > 1 {
            return Err(ConfigError::IndexNameWithMultipleAttributes {
                attributes: attributes.iter().map(|a| a.to_string()).collect(),
            });
        }

        for attribute in attributes {
            let backing_index = self.resolve_index(attribute, &options)?;
            let rule = UniquenessRule::new(attribute, &options, backing_index);
            debug!(
                model = self.model,
                attribute = %attribute,
                index = ?rule.backing_index(),
                "declared db uniqueness"
            );
            self.registry.register(ConstraintRule::Uniqueness(rule))?;
        }
        Ok(())
    }

    /// Declare a database-backed belongs-to on `<relation>_id`
    ///
    /// # Errors
    /// See [`Self::db_belongs_to_with_foreign_key`]
    pub fn db_belongs_to(&mut self, relation: &str) -> ConfigResult<()> {
        self.db_belongs_to_with_foreign_key(relation, &format!("{}_id", relation))
    }

    /// Declare a database-backed belongs-to on an explicit column
    ///
    /// # Errors
    /// Returns `ConfigError::UnsupportedDatabase` for engines without
    /// enforced foreign keys, and `ConfigError::ForeignKeyNotFound` when no
    /// foreign key exists on `column` and the check is not skipped
    pub fn db_belongs_to_with_foreign_key(&mut self, relation: &str, column: &str) -> ConfigResult<()> {
        let engine = self.adapter.engine();
        if !engine.supports_foreign_keys() {
            return Err(ConfigError::UnsupportedDatabase {
                method: "db_belongs_to".to_string(),
                database: engine.name().to_string(),
            });
        }

        let foreign_key = self.adapter.find_foreign_key_by_column(column).cloned();
        if foreign_key.is_none() {
            if !self.settings.skip_index_check {
                return Err(ConfigError::foreign_key_not_found(
                    column,
                    self.adapter.foreign_keys(),
                ));
            }
            warn!(
                model = self.model,
                table = self.adapter.table_name(),
                column,
                "no foreign key backs db_belongs_to, check skipped"
            );
        }

        debug!(model = self.model, relation, column, "declared db belongs_to");
        self.registry
            .register(ConstraintRule::Presence(PresenceRule::new(relation, column, foreign_key)))
    }

    /// Declare database-backed presence of each attribute
    ///
    /// An attribute with a foreign key on `<attribute>_id` is an association
    /// keyed by that column: a set foreign key passes, and a violation on it
    /// becomes "must exist". Any other attribute is a plain column that must
    /// not be blank.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` without attributes, and
    /// `ConfigError::DuplicateRule` when another rule already covers the
    /// column
    pub fn validates_db_presence_of(&mut self, attributes: &[&str]) -> ConfigResult<()> {
        if attributes.is_empty() {
            return Err(ConfigError::Invalid(
                "validates_db_presence_of needs at least one attribute".to_string(),
            ));
        }

        for attribute in attributes {
            let column = format!("{}_id", attribute);
            let rule = match self.adapter.find_foreign_key_by_column(&column) {
                Some(foreign_key) => PresenceRule::with_kind(
                    PresenceKind::Association,
                    attribute,
                    &column,
                    Some(foreign_key.clone()),
                ),
                None => PresenceRule::attribute(attribute),
            };
            debug!(
                model = self.model,
                attribute = %attribute,
                column = rule.column(),
                kind = ?rule.kind(),
                "declared db presence"
            );
            self.registry.register(ConstraintRule::Presence(rule))?;
        }
        Ok(())
    }

    fn check_options(&self, options: &UniquenessOptions) -> ConfigResult<()> {
        match options
            .provided()
            .into_iter()
            .find(|o| !self.adapter.supports_option(*o))
        {
            Some(option) => Err(ConfigError::OptionNotSupported {
                option: option.to_string(),
                database: self.adapter.engine().name().to_string(),
                supported: self
                    .adapter
                    .supported_options()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            }),
            None => Ok(()),
        }
    }

    /// Unique index backing `attribute`, `None` only when the existence
    /// check is skipped
    fn resolve_index(&self, attribute: &str, options: &UniquenessOptions) -> ConfigResult<Option<&'a Index>> {
        let mut columns = vec![attribute.to_string()];
        columns.extend(options.scope_ref().iter().cloned());
        let columns = key::unify_columns(&columns);
        let where_clause = options.where_clause_ref();
        let index_name = options.index_name_ref();
        let adapter: &'a SchemaAdapter = self.adapter;

        let found = match index_name {
            Some(name) => adapter.find_index_by_name(name).filter(|index| {
                index.columns.count() == columns.len()
                    && index.where_clause.is_some() == where_clause.is_some()
            }),
            None => adapter.find_index(&columns, where_clause),
        };

        match found {
            Some(index) => Ok(Some(index)),
            None if self.settings.skip_index_check => {
                warn!(
                    model = self.model,
                    table = self.adapter.table_name(),
                    columns = ?columns,
                    "no unique index backs db uniqueness, check skipped"
                );
                Ok(None)
            }
            None => Err(ConfigError::index_not_found(
                self.adapter.table_name(),
                &columns,
                where_clause,
                index_name,
                self.adapter.unique_indexes(),
            )),
        }
    }
}
