use thiserror::Error;

use super::dialect::{self, ExprError};
use crate::model::Transform;

/// A transform failed. No partial result is produced.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("transform #{index} failed: {source}")]
pub struct TransformError {
    pub index: usize,
    #[source]
    pub source: ExprError,
}

/// Runs `transforms` in order, each one consuming the previous output.
pub fn apply(transforms: &[Transform], input: serde_json::Value) -> Result<serde_json::Value, TransformError> {
    transforms
        .iter()
        .enumerate()
        .try_fold(input, |current, (index, transform)| {
            dialect::transform(&transform.spec, &transform.expr, &current)
                .map_err(|source| TransformError { index, source })
        })
}
