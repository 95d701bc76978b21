pub mod metadata;

pub use metadata::{
    NodeConstructor, NodeDeclaration, NodeRegistration, NodeRegistrationFn, OperatorConstructor,
    ParameterSchema, PortMetadata, SinkConstructor, SourceConstructor,
};

use crate::error::{NodeError, Result};
use std::collections::BTreeMap;

/// Node types known to a runtime, by id.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    declarations: BTreeMap<String, NodeDeclaration>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node type submitted with `inventory::submit!` anywhere in the binary.
    pub fn from_inventory() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<NodeRegistration> {
            let declaration = (registration.0)();
            if let Err(e) = registry.register(declaration) {
                tracing::warn!("Skipping node registration: {}", e);
            }
        }
        registry
    }

    pub fn register(&mut self, declaration: NodeDeclaration) -> Result<()> {
        if self.declarations.contains_key(&declaration.id) {
            return Err(NodeError::DuplicateNode(declaration.id));
        }
        self.declarations.insert(declaration.id.clone(), declaration);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&NodeDeclaration> {
        self.declarations
            .get(id)
            .ok_or_else(|| NodeError::UnknownNode(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.declarations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}
