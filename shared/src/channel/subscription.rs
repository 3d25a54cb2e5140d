use serde::{Deserialize, Serialize};

use crate::types::InstanceId;

/// How a delivered message lands on a component
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerSpec {
    /// Invoke an operation; `params` is its declared parameter order
    Operation {
        name: String,
        #[serde(default)]
        params: Vec<String>,
    },
    /// Property link: set `property`, reported under `operation`
    Property { operation: String, property: String },
}

impl HandlerSpec {
    pub fn operation(name: &str) -> Self {
        HandlerSpec::Operation {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn operation_with_params(name: &str, params: &[String]) -> Self {
        HandlerSpec::Operation {
            name: name.to_string(),
            params: params.to_vec(),
        }
    }

    pub fn property(operation: &str, property: &str) -> Self {
        HandlerSpec::Property {
            operation: operation.to_string(),
            property: property.to_string(),
        }
    }

    pub fn operation_name(&self) -> &str {
        match self {
            HandlerSpec::Operation { name, .. } => name,
            HandlerSpec::Property { operation, .. } => operation,
        }
    }
}

/// A listener on a channel. Unique per (instance, operation).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub instance_id: InstanceId,
    pub handler: HandlerSpec,
    /// Role the subscription was wired under
    pub scope: String,
}

impl Subscription {
    pub fn new(instance_id: &str, handler: HandlerSpec, scope: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            handler,
            scope: scope.to_string(),
        }
    }

    pub fn operation(&self) -> &str {
        self.handler.operation_name()
    }

    pub fn matches(&self, instance_id: &str, operation: &str) -> bool {
        self.instance_id == instance_id && self.operation() == operation
    }
}
