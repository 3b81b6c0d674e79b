//! Mapping between [`Value`] and its JSON wire representation.
//!
//! The canonical schema uses camelCase field names, numeric integers and nested
//! JSON objects. Decoding also accepts what older encoders produced:
//!
//! - snake_case field names (`default_variant`, `boolean_value`, ...),
//! - `null` for absent variant members and omitted zero values (`{"booleanValue": {}}`),
//! - integers as decimal strings and JSON values as encoded strings,
//! - dialect enum ordinals instead of tokens and `exp` instead of `expr`.
//!
//! Unknown fields are ignored. Both functions are pure and safe to call from any
//! task without synchronization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    EvaluationSlots, EvaluationTest, JsonEvaluation, JsonObject, ServerTime, TargetingRule, TargetingRuleSpec,
    Transform, TransformSpec, ValidationError, Value, ValueEvaluation,
};

/// Malformed or schema-incompatible wire bytes.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed value: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("variants.{variant}: {source}")]
    Variant {
        variant: String,
        #[source]
        source: ValidationError,
    },
    #[error("{field}: {reason}")]
    Field { field: String, reason: String },
}

/// Decodes a value from wire bytes.
pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
    let wire: WireValue<serde_json::Value> = serde_json::from_slice(bytes)?;
    wire.into_value()
}

/// Encodes a value in the canonical wire schema.
pub fn encode(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&WireValue::<WireEvaluation>::from_value(value))
}

/// Body of the Get and Delete calls.
pub fn encode_id_request(id: &str) -> Result<Vec<u8>, serde_json::Error> {
    #[derive(Serialize)]
    struct IdRequest<'a> {
        id: &'a str,
    }
    serde_json::to_vec(&IdRequest { id })
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValue<V> {
    id: String,
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(alias = "default_variant")]
    default_variant: String,
    // Entries are decoded one by one so errors can name the variant.
    variants: BTreeMap<String, V>,
    #[serde(default)]
    targeting: Option<WireTargeting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tests: Option<Vec<WireTest>>,
    #[serde(default, alias = "create_time", skip_serializing_if = "Option::is_none")]
    create_time: Option<ServerTime>,
    #[serde(default, alias = "update_time", skip_serializing_if = "Option::is_none")]
    update_time: Option<ServerTime>,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvaluation {
    #[serde(default, alias = "boolean_value", skip_serializing_if = "Option::is_none")]
    boolean_value: Option<WireBoolean>,
    #[serde(default, alias = "string_value", skip_serializing_if = "Option::is_none")]
    string_value: Option<WireString>,
    #[serde(default, alias = "json_value", skip_serializing_if = "Option::is_none")]
    json_value: Option<WireJson>,
    #[serde(default, alias = "integer_value", skip_serializing_if = "Option::is_none")]
    integer_value: Option<WireInteger>,
}

#[derive(Serialize, Deserialize)]
struct WireBoolean {
    #[serde(default)]
    value: Option<bool>,
}

#[derive(Serialize, Deserialize)]
struct WireString {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireJson {
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transforms: Option<Vec<WireTransform>>,
}

#[derive(Serialize, Deserialize)]
struct WireInteger {
    #[serde(default)]
    value: Option<IntegerRepr>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum IntegerRepr {
    Number(i64),
    Text(String),
}

#[derive(Serialize, Deserialize)]
struct WireTransform {
    #[serde(default)]
    spec: Option<TransformSpec>,
    #[serde(alias = "exp")]
    expr: String,
}

#[derive(Serialize, Deserialize)]
struct WireTargeting {
    #[serde(default)]
    rules: Option<Vec<WireRule>>,
}

#[derive(Serialize, Deserialize)]
struct WireRule {
    variant: String,
    #[serde(default)]
    spec: Option<TargetingRuleSpec>,
    #[serde(alias = "exp")]
    expr: String,
}

#[derive(Serialize, Deserialize)]
struct WireTest {
    #[serde(default)]
    variables: Option<JsonObject>,
    expected: String,
}

impl WireValue<serde_json::Value> {
    fn into_value(self) -> Result<Value, DecodeError> {
        let variants = self
            .variants
            .into_iter()
            .map(|(variant, raw)| {
                let wire: WireEvaluation = serde_json::from_value(raw).map_err(|e| DecodeError::Field {
                    field: format!("variants.{}", variant),
                    reason: e.to_string(),
                })?;
                let evaluation = wire.into_evaluation(&variant)?;
                Ok((variant, evaluation))
            })
            .collect::<Result<_, DecodeError>>()?;

        let targeting = self
            .targeting
            .and_then(|t| t.rules)
            .unwrap_or_default()
            .into_iter()
            .map(|r| TargetingRule {
                variant: r.variant,
                spec: r.spec.unwrap_or_default(),
                expr: r.expr,
            })
            .collect();

        let tests = self
            .tests
            .unwrap_or_default()
            .into_iter()
            .map(|t| EvaluationTest {
                variables: t.variables.unwrap_or_default(),
                expected: t.expected,
            })
            .collect();

        Ok(Value {
            id: self.id,
            enabled: self.enabled,
            description: self.description.unwrap_or_default(),
            default_variant: self.default_variant,
            variants,
            targeting,
            tests,
            create_time: self.create_time,
            update_time: self.update_time,
        })
    }
}

impl WireValue<WireEvaluation> {
    fn from_value(value: &Value) -> Self {
        WireValue {
            id: value.id.clone(),
            enabled: value.enabled,
            description: Some(value.description.clone()).filter(|d| !d.is_empty()),
            default_variant: value.default_variant.clone(),
            variants: value
                .variants
                .iter()
                .map(|(variant, evaluation)| (variant.clone(), WireEvaluation::from_evaluation(evaluation)))
                .collect(),
            targeting: Some(WireTargeting {
                rules: Some(
                    value
                        .targeting
                        .iter()
                        .map(|r| WireRule {
                            variant: r.variant.clone(),
                            spec: Some(r.spec.clone()),
                            expr: r.expr.clone(),
                        })
                        .collect(),
                ),
            }),
            tests: Some(
                value
                    .tests
                    .iter()
                    .map(|t| WireTest {
                        variables: Some(t.variables.clone()),
                        expected: t.expected.clone(),
                    })
                    .collect(),
            )
            .filter(|tests: &Vec<WireTest>| !tests.is_empty()),
            create_time: value.create_time.clone(),
            update_time: value.update_time.clone(),
        }
    }
}

impl WireEvaluation {
    fn into_evaluation(self, variant: &str) -> Result<ValueEvaluation, DecodeError> {
        let field = |reason: String| DecodeError::Field {
            field: format!("variants.{}", variant),
            reason,
        };

        let integer = match self.integer_value {
            None => None,
            Some(WireInteger { value: None }) => Some(0),
            Some(WireInteger { value: Some(IntegerRepr::Number(n)) }) => Some(n),
            Some(WireInteger { value: Some(IntegerRepr::Text(text)) }) => Some(
                text.trim()
                    .parse::<i64>()
                    .map_err(|_| field(format!("integerValue.value `{}` is not an integer", text)))?,
            ),
        };

        let json = match self.json_value {
            None => None,
            Some(wire) => Some(JsonEvaluation {
                value: json_object(wire.value).map_err(field)?,
                transforms: wire
                    .transforms
                    .unwrap_or_default()
                    .into_iter()
                    .map(|t| Transform {
                        spec: t.spec.unwrap_or_default(),
                        expr: t.expr,
                    })
                    .collect(),
            }),
        };

        let slots = EvaluationSlots {
            boolean: self.boolean_value.map(|w| w.value.unwrap_or_default()),
            string: self.string_value.map(|w| w.value.unwrap_or_default()),
            json,
            integer,
        };
        slots.into_evaluation(variant).map_err(|source| DecodeError::Variant {
            variant: variant.to_string(),
            source,
        })
    }

    fn from_evaluation(evaluation: &ValueEvaluation) -> Self {
        match evaluation {
            ValueEvaluation::Boolean(v) => WireEvaluation {
                boolean_value: Some(WireBoolean { value: Some(*v) }),
                ..Default::default()
            },
            ValueEvaluation::String(v) => WireEvaluation {
                string_value: Some(WireString { value: Some(v.clone()) }),
                ..Default::default()
            },
            ValueEvaluation::Json(json) => WireEvaluation {
                json_value: Some(WireJson {
                    value: Some(serde_json::Value::Object(json.value.clone())),
                    transforms: Some(
                        json.transforms
                            .iter()
                            .map(|t| WireTransform {
                                spec: Some(t.spec.clone()),
                                expr: t.expr.clone(),
                            })
                            .collect(),
                    )
                    .filter(|transforms: &Vec<WireTransform>| !transforms.is_empty()),
                }),
                ..Default::default()
            },
            ValueEvaluation::Integer(v) => WireEvaluation {
                integer_value: Some(WireInteger {
                    value: Some(IntegerRepr::Number(*v)),
                }),
                ..Default::default()
            },
        }
    }
}

fn json_object(value: Option<serde_json::Value>) -> Result<JsonObject, String> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(JsonObject::new()),
        Some(serde_json::Value::Object(map)) => Ok(map),
        // Older encoders sent the object as JSON text.
        Some(serde_json::Value::String(text)) => match serde_json::from_str(&text) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            _ => Err("jsonValue.value string does not contain a JSON object".to_string()),
        },
        Some(_) => Err("jsonValue.value must be a JSON object".to_string()),
    }
}
