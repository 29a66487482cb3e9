//! Models and records
//!
//! A [`Model`] is the definition side: table, schema adapter and the chain
//! of registries built from its declarations. Records are the instances,
//! reached only through the [`Record`] trait.

pub mod entity;
pub mod errors;
pub mod record;

use std::sync::Arc;

use tracing::info;

use crate::adapters::{Engine, SchemaAdapter};
use crate::config::Settings;
use crate::error::ConfigResult;
use crate::registry::{Declarations, RegistryChain};

pub use entity::Entity;
pub use errors::{ErrorDetail, ErrorKind, Errors};
pub use record::{Association, Record};

/// A model definition with its registered rules
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    primary_key: String,
    adapter: Arc<SchemaAdapter>,
    chain: RegistryChain,
}

impl Model {
    /// Define a root model.
    ///
    /// `declare` runs once; every misconfiguration it hits is returned
    /// immediately and no model is built.
    pub fn define<F>(name: &str, adapter: SchemaAdapter, settings: &Settings, declare: F) -> ConfigResult<Self>
    where
        F: FnOnce(&mut Declarations<'_>) -> ConfigResult<()>,
    {
        let mut declarations = Declarations::new(name, &adapter, settings);
        declare(&mut declarations)?;
        let chain = RegistryChain::root(declarations.finish());

        info!(model = name, table = adapter.table_name(), "model defined");
        Ok(Self {
            name: name.to_string(),
            primary_key: "id".to_string(),
            adapter: Arc::new(adapter),
            chain,
        })
    }

    /// Define a model derived from this one, sharing its table.
    ///
    /// The derived model answers to its own rules first, then to every
    /// ancestor's.
    pub fn subclass<F>(&self, name: &str, settings: &Settings, declare: F) -> ConfigResult<Self>
    where
        F: FnOnce(&mut Declarations<'_>) -> ConfigResult<()>,
    {
        let mut declarations = Declarations::new(name, &self.adapter, settings);
        declare(&mut declarations)?;
        let chain = RegistryChain::derive(declarations.finish(), &self.chain);

        info!(model = name, parent = %self.name, depth = chain.depth(), "model defined");
        Ok(Self {
            name: name.to_string(),
            primary_key: self.primary_key.clone(),
            adapter: Arc::clone(&self.adapter),
            chain,
        })
    }

    /// Use a primary key column other than `id`
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        self.adapter.table_name()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn engine(&self) -> Engine {
        self.adapter.engine()
    }

    pub fn adapter(&self) -> &SchemaAdapter {
        &self.adapter
    }

    pub fn chain(&self) -> &RegistryChain {
        &self.chain
    }
}
