use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named event travelling over a channel. Body fields keep their insertion
/// order, which positional mediation relies on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    #[serde(default)]
    pub body: Map<String, Value>,
}

impl Message {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            body: Map::new(),
        }
    }

    pub fn with_body(name: &str, body: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            body,
        }
    }

    /// Builder-style field insertion
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Body values in field order
    pub fn values(&self) -> Vec<Value> {
        self.body.values().cloned().collect()
    }

    /// Copy of this message under a different body, same name
    pub fn rebody(&self, body: Map<String, Value>) -> Self {
        Self {
            name: self.name.clone(),
            body,
        }
    }

    /// Builds a message whose body is `args` keyed positionally (`"0"`, `"1"`, ...).
    /// Used when a continuation's captured arguments are replayed as an operation call.
    pub fn from_args(name: &str, args: &[Value]) -> Self {
        let mut body = Map::new();
        for (index, arg) in args.iter().enumerate() {
            body.insert(index.to_string(), arg.clone());
        }
        Self::with_body(name, body)
    }
}
