//! Expression dialects.
//!
//! CEL programs see each context entry as a top-level variable; referencing one
//! that was not supplied is a runtime error. JSON-logic documents receive the whole
//! context as their data object and a missing `var` resolves to `null`.

use cel_interpreter::{Context, Program};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::model::{JsonObject, TargetingRuleSpec, TransformSpec};

/// Variable name a transform expression reads its input from.
pub const TRANSFORM_INPUT: &str = "value";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("cannot bind variable `{name}`: {reason}")]
    Binding { name: String, reason: String },
    #[error("execution error: {0}")]
    Execution(String),
    #[error("expected a boolean result, got {0}")]
    NotBoolean(serde_json::Value),
    #[error("result is not representable as JSON: {0}")]
    Output(String),
    #[error("unsupported spec `{0}`")]
    UnsupportedSpec(String),
}

/// Evaluates a targeting predicate against `variables`.
pub fn predicate(spec: &TargetingRuleSpec, expr: &str, variables: &JsonObject) -> Result<bool, ExprError> {
    match spec {
        TargetingRuleSpec::Cel => match cel(expr, variables.iter().map(|(k, v)| (k.as_str(), v)))? {
            serde_json::Value::Bool(b) => Ok(b),
            other => Err(ExprError::NotBoolean(other)),
        },
        TargetingRuleSpec::JsonLogic => {
            let logic: serde_json::Value =
                serde_json::from_str(expr).map_err(|e| ExprError::Parse(e.to_string()))?;
            let data = serde_json::Value::Object(variables.clone());
            let result = jsonlogic_rs::apply(&logic, &data).map_err(|e| ExprError::Execution(e.to_string()))?;
            Ok(truthy(&result))
        }
        TargetingRuleSpec::Invalid(raw) => Err(ExprError::UnsupportedSpec(raw.clone())),
    }
}

/// Evaluates a transform expression with `input` bound to [`TRANSFORM_INPUT`].
pub fn transform(spec: &TransformSpec, expr: &str, input: &serde_json::Value) -> Result<serde_json::Value, ExprError> {
    match spec {
        TransformSpec::Cel => cel(expr, [(TRANSFORM_INPUT, input)]),
        TransformSpec::Invalid(raw) => Err(ExprError::UnsupportedSpec(raw.clone())),
    }
}

fn cel<'a, I>(expr: &str, bindings: I) -> Result<serde_json::Value, ExprError>
where
    I: IntoIterator<Item = (&'a str, &'a serde_json::Value)>,
{
    let program = Program::compile(expr).map_err(|e| ExprError::Parse(e.to_string()))?;

    let mut context = Context::default();
    for (name, value) in bindings {
        context
            .add_variable(name, CelJson(value))
            .map_err(|e| ExprError::Binding {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
    }

    let result = program
        .execute(&context)
        .map_err(|e| ExprError::Execution(e.to_string()))?;
    result.json().map_err(|e| ExprError::Output(e.to_string()))
}

/// JSON as CEL sees it: integral numbers become `int` whenever they fit, so
/// `count == 1` compares like with like.
struct CelJson<'a>(&'a serde_json::Value);

impl Serialize for CelJson<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    serializer.serialize_i64(i)
                } else if let Some(u) = n.as_u64() {
                    serializer.serialize_u64(u)
                } else {
                    serializer.serialize_f64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::Array(items) => serializer.collect_seq(items.iter().map(CelJson)),
            serde_json::Value::Object(map) => serializer.collect_map(map.iter().map(|(k, v)| (k, CelJson(v)))),
            other => other.serialize(serializer),
        }
    }
}

/// JSON-logic truthiness.
fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(_) => true,
    }
}
