/// Declarative builder inputs for a [`Value`].
pub mod config;
/// Cross-field validation.
pub mod validate;
/// The value entity and its nested structures.
pub mod value;

pub use config::{unixtime, ConfigError, ValueConfig};
pub use validate::ValidationError;
pub use value::{
    EvaluationSlots, EvaluationTest, JsonEvaluation, JsonObject, ServerTime, TargetingRule, TargetingRuleSpec,
    Transform, TransformSpec, Value, ValueEvaluation, Variants,
};
