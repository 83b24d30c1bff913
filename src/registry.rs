use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::component::{Component, ComponentBuilder};
use crate::executor::Executor;
use crate::spec::ComponentSpec;
use crate::types::TypeRegistry;

#[derive(Clone)]
pub struct ComponentKind {
    pub spec: Arc<ComponentSpec>,
    pub executor: Arc<dyn Executor>,
}

/// Explicit table of component kinds. Authoring code owns one and passes it
/// around; nothing registers itself implicitly.
#[derive(Default)]
pub struct ComponentRegistry {
    types: TypeRegistry,
    kinds: BTreeMap<String, ComponentKind>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: TypeRegistry) -> Self {
        Self {
            types,
            kinds: BTreeMap::new(),
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn register(&mut self, spec: ComponentSpec, executor: Arc<dyn Executor>) {
        self.kinds.insert(
            spec.kind().to_string(),
            ComponentKind {
                spec: Arc::new(spec),
                executor,
            },
        );
    }

    pub fn get(&self, kind: &str) -> Result<&ComponentKind> {
        self.kinds.get(kind).ok_or_else(|| {
            anyhow!(
                "Unknown component kind '{}'. Available kinds: {}",
                kind,
                self.known_kinds().join(", ")
            )
        })
    }

    pub fn builder(&self, kind: &str) -> Result<ComponentBuilder> {
        let entry = self.get(kind)?;
        Ok(Component::builder(
            entry.spec.clone(),
            entry.executor.clone(),
        ))
    }

    pub fn known_kinds(&self) -> Vec<String> {
        self.kinds.keys().cloned().collect()
    }
}
