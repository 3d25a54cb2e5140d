use std::collections::HashMap;

use nomad_shared::{Component, ComponentDescriptor};

use crate::error::RuntimeError;

/// Creates component instances from descriptors
pub trait ComponentFactory {
    fn create(&self, descriptor: &ComponentDescriptor) -> Result<Box<dyn Component>, RuntimeError>;
}

type Constructor = Box<dyn Fn(&ComponentDescriptor) -> Box<dyn Component>>;

/// A [`ComponentFactory`] keyed by component kind
#[derive(Default)]
pub struct ComponentKinds {
    constructors: HashMap<String, Constructor>,
}

impl ComponentKinds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_kind<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(&ComponentDescriptor) -> Box<dyn Component> + 'static,
    {
        self.constructors
            .insert(kind.to_string(), Box::new(constructor));
    }

    pub fn with_kind<F>(mut self, kind: &str, constructor: F) -> Self
    where
        F: Fn(&ComponentDescriptor) -> Box<dyn Component> + 'static,
    {
        self.add_kind(kind, constructor);
        self
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }
}

impl ComponentFactory for ComponentKinds {
    fn create(&self, descriptor: &ComponentDescriptor) -> Result<Box<dyn Component>, RuntimeError> {
        let constructor =
            self.constructors
                .get(&descriptor.kind)
                .ok_or_else(|| RuntimeError::UnknownKind {
                    kind: descriptor.kind.clone(),
                })?;
        Ok(constructor(descriptor))
    }
}
