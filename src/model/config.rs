//! Declarative value configuration.
//!
//! A [`ValueConfig`] mirrors the block layout operators write by hand: one list per
//! variant kind, JSON payloads and test variables as JSON text, optional dialect
//! tokens. [`ValueConfig::build`] turns it into a [`Value`]; [`ValueConfig::from_value`]
//! goes the other way when importing an existing value.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::value::{
    EvaluationTest, JsonEvaluation, JsonObject, TargetingRule, TargetingRuleSpec, Transform, TransformSpec, Value,
    ValueEvaluation, Variants,
};

/// Errors raised while reading or building a [`ValueConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("variant `{0}` is declared more than once")]
    DuplicateVariant(String),
    #[error("{field}: invalid JSON: {source}")]
    InvalidJson {
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}: must be a JSON object, not an array or scalar")]
    NotAnObject(String),
    #[error("invalid RFC 3339 timestamp `{input}`: {source}")]
    InvalidTimestamp {
        input: String,
        #[source]
        source: time::error::Parse,
    },
    #[error("invalid setting {name}=`{value}`")]
    InvalidSetting { name: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueConfig {
    pub value_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub default_variant: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boolean_value: Vec<BooleanVariantConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub string_value: Vec<StringVariantConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_value: Vec<JsonVariantConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integer_value: Vec<IntegerVariantConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targeting: Vec<TargetingConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test: Vec<TestConfig>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanVariantConfig {
    pub variant: String,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringVariantConfig {
    pub variant: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonVariantConfig {
    pub variant: String,
    /// JSON object text.
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transform: Vec<TransformConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerVariantConfig {
    pub variant: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingConfig {
    pub variant: String,
    /// Dialect token, `cel` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// JSON object text.
    pub variables: String,
    pub expected: String,
}

impl ValueConfig {
    /// Reads a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Builds the [`Value`] this configuration describes.
    ///
    /// Building only checks what the block layout itself can get wrong (JSON text,
    /// duplicate variant ids). Cross-field rules are left to [`Value::validate`].
    pub fn build(&self) -> Result<Value, ConfigError> {
        let mut variants = Variants::new();
        let mut insert = |variant: &str, evaluation: ValueEvaluation| {
            if variants.insert(variant.to_string(), evaluation).is_some() {
                return Err(ConfigError::DuplicateVariant(variant.to_string()));
            }
            Ok(())
        };

        for v in &self.boolean_value {
            insert(&v.variant, ValueEvaluation::Boolean(v.value))?;
        }
        for v in &self.string_value {
            insert(&v.variant, ValueEvaluation::String(v.value.clone()))?;
        }
        for v in &self.json_value {
            let value = parse_object(&v.value, &format!("json_value.{}.value", v.variant))?;
            let transforms = v
                .transform
                .iter()
                .map(|t| Transform {
                    spec: t.spec.as_deref().map(TransformSpec::from_token).unwrap_or_default(),
                    expr: t.expr.clone(),
                })
                .collect();
            insert(&v.variant, ValueEvaluation::Json(JsonEvaluation { value, transforms }))?;
        }
        for v in &self.integer_value {
            insert(&v.variant, ValueEvaluation::Integer(v.value))?;
        }

        let targeting = self
            .targeting
            .iter()
            .map(|t| TargetingRule {
                variant: t.variant.clone(),
                spec: t.spec.as_deref().map(TargetingRuleSpec::from_token).unwrap_or_default(),
                expr: t.expr.clone(),
            })
            .collect();

        let tests = self
            .test
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Ok(EvaluationTest {
                    variables: parse_object(&t.variables, &format!("test.{}.variables", i))?,
                    expected: t.expected.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Value {
            id: self.value_id.clone(),
            enabled: self.enabled,
            description: self.description.clone().unwrap_or_default(),
            default_variant: self.default_variant.clone(),
            variants,
            targeting,
            tests,
            create_time: None,
            update_time: None,
        })
    }

    /// Describes an existing [`Value`] as configuration, e.g. when importing it.
    pub fn from_value(value: &Value) -> Self {
        let mut config = ValueConfig {
            value_id: value.id.clone(),
            description: Some(value.description.clone()).filter(|d| !d.is_empty()),
            enabled: value.enabled,
            default_variant: value.default_variant.clone(),
            boolean_value: Vec::new(),
            string_value: Vec::new(),
            json_value: Vec::new(),
            integer_value: Vec::new(),
            targeting: Vec::new(),
            test: Vec::new(),
        };

        for (variant, evaluation) in &value.variants {
            let variant = variant.clone();
            match evaluation {
                ValueEvaluation::Boolean(v) => config.boolean_value.push(BooleanVariantConfig { variant, value: *v }),
                ValueEvaluation::String(v) => config.string_value.push(StringVariantConfig {
                    variant,
                    value: v.clone(),
                }),
                ValueEvaluation::Json(json) => config.json_value.push(JsonVariantConfig {
                    variant,
                    value: serde_json::Value::Object(json.value.clone()).to_string(),
                    transform: json
                        .transforms
                        .iter()
                        .map(|t| TransformConfig {
                            spec: Some(t.spec.token().to_string()),
                            expr: t.expr.clone(),
                        })
                        .collect(),
                }),
                ValueEvaluation::Integer(v) => config.integer_value.push(IntegerVariantConfig { variant, value: *v }),
            }
        }

        config.targeting = value
            .targeting
            .iter()
            .map(|r| TargetingConfig {
                variant: r.variant.clone(),
                spec: Some(r.spec.token().to_string()),
                expr: r.expr.clone(),
            })
            .collect();

        config.test = value
            .tests
            .iter()
            .map(|t| TestConfig {
                variables: serde_json::Value::Object(t.variables.clone()).to_string(),
                expected: t.expected.clone(),
            })
            .collect();

        config
    }
}

fn parse_object(text: &str, field: &str) -> Result<JsonObject, ConfigError> {
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|source| ConfigError::InvalidJson {
        field: field.to_string(),
        source,
    })?;
    match parsed {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAnObject(field.to_string())),
    }
}

/// Converts an RFC 3339 timestamp to Unix seconds.
///
/// Targeting expressions compare against numeric times supplied in the
/// evaluation context; this keeps hand-written configuration readable.
pub fn unixtime(rfc3339: &str) -> Result<i64, ConfigError> {
    let parsed = OffsetDateTime::parse(rfc3339, &Rfc3339).map_err(|source| ConfigError::InvalidTimestamp {
        input: rfc3339.to_string(),
        source,
    })?;
    Ok(parsed.unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn bool_config() -> ValueConfig {
        serde_json::from_value(json!({
            "value_id": "test-bool-value",
            "description": "test bool value",
            "default_variant": "off",
            "boolean_value": [
                { "variant": "off", "value": false },
                { "variant": "on", "value": true }
            ],
            "targeting": [
                { "variant": "on", "spec": "cel", "expr": "env == 'dev'" },
                { "variant": "on", "expr": "userId == 'XXX'" }
            ],
            "test": [
                { "variables": "{\"env\":\"dev\"}", "expected": "on" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_build_boolean_value() {
        let value = bool_config().build().unwrap();
        assert_eq!(value.id, "test-bool-value");
        assert!(value.enabled);
        assert_eq!(value.description, "test bool value");
        assert_eq!(value.variants.len(), 2);
        assert_eq!(value.variants["on"], ValueEvaluation::Boolean(true));
        assert_eq!(value.targeting.len(), 2);
        assert_eq!(value.targeting[1].spec, TargetingRuleSpec::Cel);
        assert_eq!(value.tests[0].variables["env"], json!("dev"));
        assert_eq!(value.validate(), Ok(()));
    }

    #[test]
    fn test_explicit_unknown_spec_is_kept() {
        let mut config = bool_config();
        config.targeting[0].spec = Some("rego".to_string());
        let value = config.build().unwrap();
        assert_eq!(value.targeting[0].spec, TargetingRuleSpec::Invalid("rego".to_string()));
        assert!(value.validate().is_err());
    }

    #[test]
    fn test_json_value_must_be_object() {
        let config: ValueConfig = serde_json::from_value(json!({
            "value_id": "cfg",
            "default_variant": "base",
            "json_value": [{ "variant": "base", "value": "[1, 2]" }]
        }))
        .unwrap();
        assert!(matches!(config.build(), Err(ConfigError::NotAnObject(field)) if field == "json_value.base.value"));
    }

    #[test]
    fn test_json_value_with_transforms() {
        let config: ValueConfig = serde_json::from_value(json!({
            "value_id": "cfg",
            "default_variant": "base",
            "json_value": [{
                "variant": "base",
                "value": "{\"a\": 1}",
                "transform": [{ "expr": "value" }]
            }]
        }))
        .unwrap();
        let value = config.build().unwrap();
        assert_eq!(value.variants["base"].transforms(), &[Transform::cel("value")]);
    }

    #[test]
    fn test_duplicate_variant_across_kinds() {
        let mut config = bool_config();
        config.string_value.push(StringVariantConfig {
            variant: "on".to_string(),
            value: "yes".to_string(),
        });
        assert!(matches!(config.build(), Err(ConfigError::DuplicateVariant(v)) if v == "on"));
    }

    #[test]
    fn test_invalid_test_variables() {
        let mut config = bool_config();
        config.test[0].variables = "{not json".to_string();
        assert!(matches!(config.build(), Err(ConfigError::InvalidJson { field, .. }) if field == "test.0.variables"));
    }

    #[test]
    fn test_from_value_round_trip() {
        let value = bool_config().build().unwrap();
        let rebuilt = ValueConfig::from_value(&value).build().unwrap();
        assert_eq!(rebuilt, value);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&bool_config()).unwrap().as_bytes()).unwrap();

        let loaded = ValueConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, bool_config());
    }

    #[test]
    fn test_unixtime() {
        assert_eq!(unixtime("2024-01-01T00:00:00Z").unwrap(), 1_704_067_200);
        assert_eq!(unixtime("2024-01-01T09:00:00+09:00").unwrap(), 1_704_067_200);
        assert!(matches!(unixtime("yesterday"), Err(ConfigError::InvalidTimestamp { .. })));
    }
}
