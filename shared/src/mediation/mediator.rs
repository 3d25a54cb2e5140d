use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mediation::{error::MediationError, expr::Expr};

/// Declared type of a channel parameter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::Any => true,
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamType::Any => "any",
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParam {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ParamType,
}

/// Receiver-side mediation: target parameter names in declared order, each
/// optionally computed by a transform expression instead of taken
/// positionally.
#[derive(Clone, Debug, Default)]
pub struct MediationPlan {
    targets: Vec<(String, Option<Expr>)>,
}

impl MediationPlan {
    /// Compiles the plan; an unparsable transform fails here, at wiring time
    pub fn compile(
        targets: &[String],
        transforms: &HashMap<String, String>,
    ) -> Result<Self, MediationError> {
        let mut compiled = Vec::with_capacity(targets.len());
        for target in targets {
            let transform = match transforms.get(target) {
                Some(source) => Some(Expr::parse(source)?),
                None => None,
            };
            compiled.push((target.clone(), transform));
        }
        Ok(Self { targets: compiled })
    }

    pub fn is_identity(&self) -> bool {
        self.targets.is_empty()
    }

    /// Maps a sender's body onto this plan's target parameters.
    ///
    /// `source_params` is the sender's declared parameter order; when empty
    /// the body's own field order is used. Targets beyond the available
    /// source values are left out, extra source values are dropped.
    pub fn apply(
        &self,
        source_params: &[String],
        body: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MediationError> {
        if self.is_identity() {
            return Ok(body.clone());
        }

        let scope: Vec<(String, Value)> = if source_params.is_empty() {
            body.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        } else {
            source_params
                .iter()
                .map(|name| (name.clone(), body.get(name).cloned().unwrap_or(Value::Null)))
                .collect()
        };

        let mut mediated = Map::new();
        for (index, (target, transform)) in self.targets.iter().enumerate() {
            match transform {
                Some(expr) => {
                    mediated.insert(target.clone(), expr.evaluate(&scope)?);
                }
                None => {
                    if let Some((_, value)) = scope.get(index) {
                        mediated.insert(target.clone(), value.clone());
                    }
                }
            }
        }
        Ok(mediated)
    }
}

/// Renames body fields positionally onto `targets`, keeping target order and
/// dropping extra fields. An empty target list leaves the body unchanged.
///
/// A body that already carries any target name was mediated upstream; its
/// fields are then picked by name, and targets it lacks stay absent.
pub fn remap_positionally(body: &Map<String, Value>, targets: &[String]) -> Map<String, Value> {
    if targets.is_empty() {
        return body.clone();
    }
    if targets.iter().any(|target| body.contains_key(target)) {
        return targets
            .iter()
            .filter_map(|target| body.get(target).map(|value| (target.clone(), value.clone())))
            .collect();
    }
    targets
        .iter()
        .zip(body.values())
        .map(|(target, value)| (target.clone(), value.clone()))
        .collect()
}

/// Checks mediated values positionally against the channel's parameter types
pub fn check_param_types(
    params: &[ChannelParam],
    body: &Map<String, Value>,
) -> Result<(), MediationError> {
    for (param, (_, value)) in params.iter().zip(body.iter()) {
        if !param.kind.accepts(value) {
            return Err(MediationError::ParamTypeMismatch {
                param: param.name.clone(),
                expected: param.kind.name(),
                found: value.to_string(),
            });
        }
    }
    Ok(())
}
