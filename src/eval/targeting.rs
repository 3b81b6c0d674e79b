use thiserror::Error;

use super::dialect::{self, ExprError};
use super::Variables;
use crate::model::{TargetingRule, Value};

/// A targeting rule failed to evaluate. Evaluation stops at that rule.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("targeting rule #{index} (variant `{variant}`) failed: {source}")]
pub struct EvaluationError {
    pub index: usize,
    pub variant: String,
    #[source]
    pub source: ExprError,
}

/// Why a variant was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// The targeting rule at this index matched.
    Rule(usize),
    /// No rule matched.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<'a> {
    pub variant: &'a str,
    pub reason: Reason,
}

/// Selects a variant for `variables`.
///
/// Returns `Ok(None)` for a disabled value without looking at its rules.
pub fn select<'a>(value: &'a Value, variables: &Variables) -> Result<Option<Selection<'a>>, EvaluationError> {
    if !value.enabled {
        return Ok(None);
    }
    Ok(Some(select_ignoring_enabled(value, variables)?))
}

/// Rule selection with the default fallback, regardless of `enabled`.
pub(crate) fn select_ignoring_enabled<'a>(
    value: &'a Value,
    variables: &Variables,
) -> Result<Selection<'a>, EvaluationError> {
    Ok(match match_rules(&value.targeting, variables)? {
        Some((index, rule)) => Selection {
            variant: &rule.variant,
            reason: Reason::Rule(index),
        },
        None => Selection {
            variant: &value.default_variant,
            reason: Reason::Default,
        },
    })
}

/// Returns the first rule whose predicate holds, with its index.
pub fn match_rules<'a>(
    rules: &'a [TargetingRule],
    variables: &Variables,
) -> Result<Option<(usize, &'a TargetingRule)>, EvaluationError> {
    for (index, rule) in rules.iter().enumerate() {
        let matched = dialect::predicate(&rule.spec, &rule.expr, variables).map_err(|source| EvaluationError {
            index,
            variant: rule.variant.clone(),
            source,
        })?;
        if matched {
            return Ok(Some((index, rule)));
        }
    }
    Ok(None)
}
