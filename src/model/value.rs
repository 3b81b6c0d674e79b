use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Variant id → evaluation. Ordered so encoding is deterministic.
pub type Variants = BTreeMap<String, ValueEvaluation>;

/// A JSON object, the payload of a JSON-kind variant and of evaluation test variables.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// A remote configuration value: variants, targeting rules and self-check tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Primary key. Immutable once created; uniqueness is owned by the server.
    pub id: String,
    /// Disabled values are never evaluated.
    pub enabled: bool,
    /// Free text, never exposed to the evaluation client.
    pub description: String,
    /// Variant returned when no targeting rule matches.
    pub default_variant: String,
    pub variants: Variants,
    /// Evaluated in order, first match wins.
    pub targeting: Vec<TargetingRule>,
    pub tests: Vec<EvaluationTest>,
    /// Server-assigned, echoed back on update.
    pub create_time: Option<ServerTime>,
    /// Server-assigned, echoed back on update.
    pub update_time: Option<ServerTime>,
}

impl Value {
    /// Creates an enabled value with no variants, rules or tests.
    pub fn new(id: impl Into<String>, default_variant: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            description: String::new(),
            default_variant: default_variant.into(),
            variants: Variants::new(),
            targeting: Vec::new(),
            tests: Vec::new(),
            create_time: None,
            update_time: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>, evaluation: ValueEvaluation) -> Self {
        self.variants.insert(variant.into(), evaluation);
        self
    }

    pub fn with_rule(mut self, rule: TargetingRule) -> Self {
        self.targeting.push(rule);
        self
    }

    pub fn with_test(mut self, test: EvaluationTest) -> Self {
        self.tests.push(test);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns `self` carrying the server-owned fields of `current`.
    ///
    /// Every caller-owned field comes from `self`; `create_time` and `update_time`
    /// come from `current`, the state most recently read from the server. This is
    /// the merge step of an update's read-modify-write sequence.
    pub fn merge_server_fields(mut self, current: &Value) -> Value {
        self.create_time = current.create_time.clone();
        self.update_time = current.update_time.clone();
        self
    }

    /// Returns a copy with the server-owned fields cleared.
    pub fn without_server_fields(&self) -> Value {
        Value {
            create_time: None,
            update_time: None,
            ..self.clone()
        }
    }
}

/// One variant's typed output. Exactly one kind per variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueEvaluation {
    Boolean(bool),
    String(String),
    Json(JsonEvaluation),
    Integer(i64),
}

impl ValueEvaluation {
    /// A JSON variant without transforms.
    pub fn json(value: JsonObject) -> Self {
        ValueEvaluation::Json(JsonEvaluation {
            value,
            transforms: Vec::new(),
        })
    }

    /// Canonical wire name of this kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ValueEvaluation::Boolean(_) => "booleanValue",
            ValueEvaluation::String(_) => "stringValue",
            ValueEvaluation::Json(_) => "jsonValue",
            ValueEvaluation::Integer(_) => "integerValue",
        }
    }

    pub fn transforms(&self) -> &[Transform] {
        match self {
            ValueEvaluation::Json(json) => &json.transforms,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonEvaluation {
    pub value: JsonObject,
    /// Applied in order after the variant is selected.
    pub transforms: Vec<Transform>,
}

/// The historical evaluation shape: four optional members, of which exactly one
/// must be set. Convert with [`EvaluationSlots::into_evaluation`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationSlots {
    pub boolean: Option<bool>,
    pub string: Option<String>,
    pub json: Option<JsonEvaluation>,
    pub integer: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetingRule {
    /// Variant selected when `expr` holds.
    pub variant: String,
    pub spec: TargetingRuleSpec,
    pub expr: String,
}

impl TargetingRule {
    pub fn cel(variant: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            spec: TargetingRuleSpec::Cel,
            expr: expr.into(),
        }
    }

    pub fn json_logic(variant: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            spec: TargetingRuleSpec::JsonLogic,
            expr: expr.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub spec: TransformSpec,
    pub expr: String,
}

impl Transform {
    pub fn cel(expr: impl Into<String>) -> Self {
        Self {
            spec: TransformSpec::Cel,
            expr: expr.into(),
        }
    }
}

/// A sample evaluation context and the variant it must resolve to.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationTest {
    pub variables: JsonObject,
    pub expected: String,
}

impl EvaluationTest {
    pub fn new(variables: JsonObject, expected: impl Into<String>) -> Self {
        Self {
            variables,
            expected: expected.into(),
        }
    }
}

/// Opaque server timestamp. Never interpreted, only echoed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerTime(pub serde_json::Value);

/// Expression dialect of a targeting rule.
///
/// Unrecognised wire tokens are kept as [`TargetingRuleSpec::Invalid`] so that
/// validation rejects them instead of silently evaluating them as CEL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TargetingRuleSpec {
    #[default]
    Cel,
    JsonLogic,
    Invalid(String),
}

impl TargetingRuleSpec {
    pub fn from_token(token: &str) -> Self {
        match token {
            "cel" => TargetingRuleSpec::Cel,
            "json" => TargetingRuleSpec::JsonLogic,
            other => TargetingRuleSpec::Invalid(other.to_string()),
        }
    }

    fn from_ordinal(ordinal: i64) -> Self {
        match ordinal {
            0 => TargetingRuleSpec::Cel,
            1 => TargetingRuleSpec::JsonLogic,
            other => TargetingRuleSpec::Invalid(other.to_string()),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            TargetingRuleSpec::Cel => "cel",
            TargetingRuleSpec::JsonLogic => "json",
            TargetingRuleSpec::Invalid(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TargetingRuleSpec::Invalid(_))
    }
}

/// Expression dialect of a transform. Only CEL is defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TransformSpec {
    #[default]
    Cel,
    Invalid(String),
}

impl TransformSpec {
    pub fn from_token(token: &str) -> Self {
        match token {
            "cel" => TransformSpec::Cel,
            other => TransformSpec::Invalid(other.to_string()),
        }
    }

    fn from_ordinal(ordinal: i64) -> Self {
        match ordinal {
            0 => TransformSpec::Cel,
            other => TransformSpec::Invalid(other.to_string()),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            TransformSpec::Cel => "cel",
            TransformSpec::Invalid(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TransformSpec::Invalid(_))
    }
}

impl fmt::Display for TargetingRuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl fmt::Display for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

// Dialects travel as short tokens. Older encoders wrote the enum ordinal instead.
#[derive(Deserialize)]
#[serde(untagged)]
enum SpecRepr {
    Token(String),
    Ordinal(i64),
}

impl Serialize for TargetingRuleSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for TargetingRuleSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SpecRepr::deserialize(deserializer)? {
            SpecRepr::Token(token) => TargetingRuleSpec::from_token(&token),
            SpecRepr::Ordinal(ordinal) => TargetingRuleSpec::from_ordinal(ordinal),
        })
    }
}

impl Serialize for TransformSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for TransformSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SpecRepr::deserialize(deserializer)? {
            SpecRepr::Token(token) => TransformSpec::from_token(&token),
            SpecRepr::Ordinal(ordinal) => TransformSpec::from_ordinal(ordinal),
        })
    }
}
