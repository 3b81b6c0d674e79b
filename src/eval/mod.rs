//! Evaluation of a [`Value`] against a variable context.
//!
//! [`evaluate`] is the serving path: disabled values yield no result, otherwise
//! the targeting rules pick a variant and JSON variants run through their
//! transform pipeline. Every function here is a pure function of its inputs.

/// CEL and JSON-logic execution.
pub mod dialect;
/// First-match-wins variant selection.
pub mod targeting;
/// Evaluation test runner.
pub mod testing;
/// Post-selection transform pipeline.
pub mod transform;

use thiserror::Error;

use crate::model::{JsonObject, Value, ValueEvaluation};

pub use dialect::ExprError;
pub use targeting::{select, EvaluationError, Reason, Selection};
pub use testing::{TestAssertionFailure, TestFailure, TestOutcome, TestReport};
pub use transform::TransformError;

/// Evaluation context: variable name → value.
pub type Variables = JsonObject;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("selected variant `{0}` is not defined")]
    UnknownVariant(String),
}

/// The resolved output of a variant, after transforms.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Boolean(bool),
    String(String),
    Json(serde_json::Value),
    Integer(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub variant: String,
    pub reason: Reason,
    pub value: ResolvedValue,
}

/// Resolves `value` for `variables`.
///
/// `Ok(None)` means the value is disabled. A rule that cannot be evaluated is an
/// error, never a silent fallback to the default variant.
pub fn evaluate(value: &Value, variables: &Variables) -> Result<Option<Evaluation>, ResolveError> {
    let Some(selection) = select(value, variables)? else {
        return Ok(None);
    };

    let evaluation = value
        .variants
        .get(selection.variant)
        .ok_or_else(|| ResolveError::UnknownVariant(selection.variant.to_string()))?;

    let resolved = match evaluation {
        ValueEvaluation::Boolean(b) => ResolvedValue::Boolean(*b),
        ValueEvaluation::String(s) => ResolvedValue::String(s.clone()),
        ValueEvaluation::Integer(i) => ResolvedValue::Integer(*i),
        ValueEvaluation::Json(json) => ResolvedValue::Json(transform::apply(
            &json.transforms,
            serde_json::Value::Object(json.value.clone()),
        )?),
    };

    Ok(Some(Evaluation {
        variant: selection.variant.to_string(),
        reason: selection.reason,
        value: resolved,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JsonEvaluation, TargetingRule, Transform};
    use serde_json::json;

    fn vars(value: serde_json::Value) -> Variables {
        value.as_object().cloned().unwrap()
    }

    fn feed() -> Value {
        Value::new("feed", "public")
            .with_variant(
                "public",
                ValueEvaluation::Json(JsonEvaluation {
                    value: vars(json!({
                        "items": [
                            {"content": "c1", "viewable": true},
                            {"content": "c2", "viewable": false}
                        ]
                    })),
                    transforms: vec![Transform::cel(
                        r#"{"items": value.items.map(i, i.viewable ? i : {"viewable": i.viewable})}"#,
                    )],
                }),
            )
            .with_variant("limit", ValueEvaluation::Integer(10))
            .with_rule(TargetingRule::cel("limit", "tier == 'free'"))
    }

    #[test]
    fn test_json_variant_is_transformed() {
        let evaluation = evaluate(&feed(), &vars(json!({"tier": "pro"}))).unwrap().unwrap();
        assert_eq!(evaluation.variant, "public");
        assert_eq!(evaluation.reason, Reason::Default);
        assert_eq!(
            evaluation.value,
            ResolvedValue::Json(json!({
                "items": [
                    {"content": "c1", "viewable": true},
                    {"viewable": false}
                ]
            }))
        );
    }

    #[test]
    fn test_scalar_variant() {
        let evaluation = evaluate(&feed(), &vars(json!({"tier": "free"}))).unwrap().unwrap();
        assert_eq!(evaluation.value, ResolvedValue::Integer(10));
        assert_eq!(evaluation.reason, Reason::Rule(0));
    }

    #[test]
    fn test_disabled() {
        let value = feed().with_enabled(false);
        assert_eq!(evaluate(&value, &Variables::new()), Ok(None));
    }

    #[test]
    fn test_rule_error_is_not_default() {
        let err = evaluate(&feed(), &Variables::new()).unwrap_err();
        assert!(matches!(err, ResolveError::Evaluation(EvaluationError { index: 0, .. })));
    }

    #[test]
    fn test_transform_error() {
        let value = Value::new("cfg", "base").with_variant(
            "base",
            ValueEvaluation::Json(JsonEvaluation {
                value: vars(json!({"a": 1})),
                transforms: vec![Transform::cel("value.b")],
            }),
        );
        let err = evaluate(&value, &Variables::new()).unwrap_err();
        assert!(matches!(err, ResolveError::Transform(TransformError { index: 0, .. })));
    }

    #[test]
    fn test_unvalidated_dangling_variant() {
        let value = Value::new("flag", "missing").with_variant("on", ValueEvaluation::Boolean(true));
        assert_eq!(
            evaluate(&value, &Variables::new()),
            Err(ResolveError::UnknownVariant("missing".to_string()))
        );
    }
}
