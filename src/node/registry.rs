//! Node type registry: type name → factory.

use crate::error::{EngineError, Result};
use crate::node::{Node, NodeError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a fresh node body.
pub type NodeFactory = Arc<dyn Fn() -> std::result::Result<Box<dyn Node>, NodeError> + Send + Sync>;

/// Maps type names to factories. Names are matched case-insensitively.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: BTreeMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the bundled node types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtin(&mut registry);
        registry
    }

    /// Canonical form of a type name.
    pub fn canonical(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Register (or replace) a factory.
    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn() -> std::result::Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
    {
        self.factories
            .insert(Self::canonical(name), Arc::new(factory));
        self
    }

    /// Register a type constructed with `Default`.
    pub fn register_default<N>(&mut self, name: &str) -> &mut Self
    where
        N: Node + Default + 'static,
    {
        self.register(name, || Ok(Box::new(N::default())))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&Self::canonical(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build a node of type `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn Node>> {
        let key = Self::canonical(name);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| EngineError::NotFound(format!("node type `{name}`")))?;
        factory()
            .map_err(|e| EngineError::from(e).with_context(format!("constructing `{key}`")))
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
