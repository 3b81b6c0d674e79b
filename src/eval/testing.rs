//! Design-time self-check of a value's targeting rules against its attached tests.
//!
//! Tests exercise the rules even when the value is disabled, so a value can be
//! verified before it is switched on.

use thiserror::Error;

use super::targeting::{self, EvaluationError};
use crate::model::Value;

/// A test resolved to a different variant than it expected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("test #{index}: expected variant `{expected}`, got `{actual}`")]
pub struct TestAssertionFailure {
    pub index: usize,
    pub expected: String,
    pub actual: String,
}

/// First non-passing test of a [`TestReport`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TestFailure {
    #[error(transparent)]
    Assertion(#[from] TestAssertionFailure),
    #[error("test #{index}: {source}")]
    Evaluation {
        index: usize,
        #[source]
        source: EvaluationError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Passed { index: usize },
    Failed(TestAssertionFailure),
    Errored { index: usize, error: EvaluationError },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestReport {
    pub outcomes: Vec<TestOutcome>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| matches!(o, TestOutcome::Passed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|o| !matches!(o, TestOutcome::Passed { .. }))
    }

    pub fn into_result(self) -> Result<(), TestFailure> {
        for outcome in self.outcomes {
            match outcome {
                TestOutcome::Passed { .. } => {}
                TestOutcome::Failed(failure) => return Err(failure.into()),
                TestOutcome::Errored { index, error } => {
                    return Err(TestFailure::Evaluation { index, source: error });
                }
            }
        }
        Ok(())
    }
}

/// Runs every test attached to `value`.
pub fn run(value: &Value) -> TestReport {
    let outcomes = value
        .tests
        .iter()
        .enumerate()
        .map(|(index, test)| match targeting::select_ignoring_enabled(value, &test.variables) {
            Ok(selection) if selection.variant == test.expected => TestOutcome::Passed { index },
            Ok(selection) => TestOutcome::Failed(TestAssertionFailure {
                index,
                expected: test.expected.clone(),
                actual: selection.variant.to_string(),
            }),
            Err(error) => TestOutcome::Errored { index, error },
        })
        .collect();
    TestReport { outcomes }
}
