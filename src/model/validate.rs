use thiserror::Error;

use super::value::{EvaluationSlots, Value, ValueEvaluation};

/// A structural or business-rule violation in a [`Value`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A variant populated zero or several evaluation kinds.
    #[error("variant `{variant}` must set exactly one of booleanValue, stringValue, jsonValue or integerValue (found {count})")]
    VariantKindCount { variant: String, count: usize },
    #[error("value `{0}` has no variants")]
    NoVariants(String),
    #[error("default variant `{0}` is not defined")]
    UnknownDefaultVariant(String),
    #[error("targeting rule #{index} references undefined variant `{variant}`")]
    UnknownRuleVariant { index: usize, variant: String },
    #[error("targeting rule #{index} uses unknown spec `{spec}`")]
    UnknownRuleSpec { index: usize, spec: String },
    #[error("transform #{index} of variant `{variant}` uses unknown spec `{spec}`")]
    UnknownTransformSpec {
        variant: String,
        index: usize,
        spec: String,
    },
    #[error("test #{index} expects undefined variant `{expected}`")]
    UnknownTestVariant { index: usize, expected: String },
}

impl Value {
    /// Checks cross-field consistency. Returns the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.variants.is_empty() {
            return Err(ValidationError::NoVariants(self.id.clone()));
        }
        if !self.variants.contains_key(&self.default_variant) {
            return Err(ValidationError::UnknownDefaultVariant(self.default_variant.clone()));
        }

        for (index, rule) in self.targeting.iter().enumerate() {
            if !self.variants.contains_key(&rule.variant) {
                return Err(ValidationError::UnknownRuleVariant {
                    index,
                    variant: rule.variant.clone(),
                });
            }
            if !rule.spec.is_known() {
                return Err(ValidationError::UnknownRuleSpec {
                    index,
                    spec: rule.spec.to_string(),
                });
            }
        }

        for (variant, evaluation) in &self.variants {
            for (index, transform) in evaluation.transforms().iter().enumerate() {
                if !transform.spec.is_known() {
                    return Err(ValidationError::UnknownTransformSpec {
                        variant: variant.clone(),
                        index,
                        spec: transform.spec.to_string(),
                    });
                }
            }
        }

        for (index, test) in self.tests.iter().enumerate() {
            if !self.variants.contains_key(&test.expected) {
                return Err(ValidationError::UnknownTestVariant {
                    index,
                    expected: test.expected.clone(),
                });
            }
        }

        Ok(())
    }
}

impl EvaluationSlots {
    /// Collapses the four optional members into a [`ValueEvaluation`].
    pub fn into_evaluation(self, variant: &str) -> Result<ValueEvaluation, ValidationError> {
        let count = usize::from(self.boolean.is_some())
            + usize::from(self.string.is_some())
            + usize::from(self.json.is_some())
            + usize::from(self.integer.is_some());

        match self {
            EvaluationSlots { boolean: Some(b), .. } if count == 1 => Ok(ValueEvaluation::Boolean(b)),
            EvaluationSlots { string: Some(s), .. } if count == 1 => Ok(ValueEvaluation::String(s)),
            EvaluationSlots { json: Some(j), .. } if count == 1 => Ok(ValueEvaluation::Json(j)),
            EvaluationSlots { integer: Some(i), .. } if count == 1 => Ok(ValueEvaluation::Integer(i)),
            _ => Err(ValidationError::VariantKindCount {
                variant: variant.to_string(),
                count,
            }),
        }
    }
}
