//! Iteration-sequence generation and condition evaluation.
//!
//! Translates a [`LoopConfig`] plus the surrounding execution context into
//! either a finite, materialized sequence of iteration values (LIST, COUNT)
//! or a per-round predicate evaluation (CONDITION, PAGINATION). Condition
//! and pagination loops are never pre-expanded: materializing an open-ended
//! or externally-paginated source would be unsound.

pub mod condition;

use log::warn;
use serde_json::Value;

use crate::config::{LoopConfig, LoopType};
use crate::error::{FormloopError, Result};
use crate::executor::ExecutionContext;
use crate::form::FormState;
use crate::template;

pub use condition::{BasicConditionEvaluator, ConditionEvaluator, VariableBindings};

/// Stateless resolver over loop configurations.
pub struct LoopDataResolver;

impl LoopDataResolver {
    /// Materialize the iteration values for a loop, dispatching on kind.
    ///
    /// CONDITION and PAGINATION return an empty sequence; the executor
    /// drives those round-by-round via [`Self::evaluate_condition`].
    pub fn resolve_iterations(config: &LoopConfig, ctx: &ExecutionContext) -> Result<Vec<Value>> {
        match config.loop_type {
            LoopType::List => {
                let source = config.list_data_source.as_deref().ok_or_else(|| {
                    FormloopError::InvalidLoopConfig("LIST loop requires list_data_source".to_string())
                })?;
                let rendered = template::render(source, ctx);
                Ok(Self::resolve_list_data_source(&rendered, &ctx.state))
            }
            LoopType::Count => {
                let numbers =
                    Self::generate_count_iterations(config.count_start, config.count_end, config.count_step)?;
                Ok(numbers.into_iter().map(Value::from).collect())
            }
            LoopType::Condition | LoopType::Pagination => Ok(Vec::new()),
        }
    }

    /// Inclusive arithmetic sequence from `start` to `end`.
    ///
    /// Direction is inferred from the endpoints and `|step|` applied in
    /// that direction, so `(3, 0, 1)` counts down. A zero step is the
    /// infinite-loop guard and always fails.
    pub fn generate_count_iterations(start: i64, end: i64, step: i64) -> Result<Vec<i64>> {
        if step == 0 {
            return Err(FormloopError::InvalidLoopConfig(
                "count_step must not be 0".to_string(),
            ));
        }
        let magnitude = step
            .checked_abs()
            .ok_or_else(|| FormloopError::InvalidLoopConfig("count_step out of range".to_string()))?;

        let mut values = Vec::new();
        let mut current = start;
        if start <= end {
            while current <= end {
                values.push(current);
                match current.checked_add(magnitude) {
                    Some(next) => current = next,
                    None => break,
                }
            }
        } else {
            while current >= end {
                values.push(current);
                match current.checked_sub(magnitude) {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }
        Ok(values)
    }

    /// Resolve a list data-source reference. Never fails; the fallback is
    /// the literal text itself.
    ///
    /// Resolution ladder:
    /// 1. a JSON array literal is used verbatim;
    /// 2. a dotted path into form state: arrays as-is, a non-array object
    ///    yields its values, a scalar wraps to a one-element sequence;
    /// 3. otherwise the text splits on newlines (or commas), trimmed.
    ///
    /// A numeric path segment (`names.0`) is not an element access: state
    /// paths traverse object maps only, so the ref falls through to the
    /// literal split and yields `["names.0"]`.
    pub fn resolve_list_data_source(source_ref: &str, state: &FormState) -> Vec<Value> {
        let trimmed = source_ref.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        if trimmed.starts_with('[')
            && let Ok(Value::Array(items)) = serde_json::from_str(trimmed)
        {
            return items;
        }

        if let Some(value) = state.get_path(trimmed) {
            return match value {
                Value::Array(items) => items.clone(),
                Value::Object(map) => map.values().cloned().collect(),
                scalar => vec![scalar.clone()],
            };
        }

        let separator = if trimmed.contains('\n') { '\n' } else { ',' };
        trimmed
            .split(separator)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Value::String(part.to_string()))
            .collect()
    }

    /// Evaluate a loop continuation condition. Fails safe: any render,
    /// parse or evaluation error yields `false`, stopping the loop instead
    /// of crashing the host action chain.
    pub fn evaluate_condition(expression: &str, ctx: &ExecutionContext) -> bool {
        let rendered = template::render_condition(expression, ctx);
        match BasicConditionEvaluator.evaluate(&rendered, ctx) {
            Ok(result) => result,
            Err(e) => {
                warn!("condition {:?} failed to evaluate, stopping loop: {}", expression, e);
                false
            }
        }
    }
}
