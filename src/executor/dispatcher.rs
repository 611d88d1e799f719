//! Action dispatch seam.
//!
//! The production dispatcher lives in the host application and handles its
//! full action-type zoo. The loop executor only depends on the
//! [`ActionDispatcher`] trait: "run this action sequence in this context".
//! [`LocalActionDispatcher`] is the in-process implementation used by the
//! CLI and tests; it handles the action kinds the loop core itself defines
//! and stands in a placeholder for AI requests.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::error::Result;
use crate::form::{ActionKind, FormAction, FormConfig};
use crate::template;

use super::context::ExecutionContext;
use super::{LoopExecutor, signals};

/// Runs a nested action sequence once per loop iteration. Thrown signals
/// (break/continue, iteration failures) propagate out for the loop
/// executor to interpret.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        actions: &[FormAction],
        form: &FormConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<()>;
}

/// In-process dispatcher for the CLI and tests.
pub struct LocalActionDispatcher;

#[async_trait]
impl ActionDispatcher for LocalActionDispatcher {
    async fn dispatch(
        &self,
        actions: &[FormAction],
        form: &FormConfig,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        for action in actions {
            if ctx.is_cancelled() {
                return Err(crate::error::FormloopError::Cancelled);
            }
            debug!("dispatching action {}", action.id);
            match &action.kind {
                ActionKind::Basic { action_type, template } => {
                    if let Some(text) = template {
                        let rendered = template::render(text, ctx);
                        debug!("basic action {} ({}): {}", action.id, action_type, rendered);
                        ctx.outputs.push(rendered);
                    }
                }
                ActionKind::AiRequest { prompt, output_variable } => {
                    // No network locally; the rendered prompt doubles as
                    // the response so downstream actions have a value.
                    let rendered = template::render(prompt, ctx);
                    ctx.state
                        .set(output_variable.clone(), Value::String(format!("[ai] {}", rendered)));
                }
                ActionKind::SuggestModal { fields } => {
                    // No UI locally; generated fields default to null.
                    for field in fields {
                        if ctx.state.get(&field.label).is_none() {
                            ctx.state.set(field.label.clone(), Value::Null);
                        }
                    }
                }
                ActionKind::Break => signals::request_break(ctx)?,
                ActionKind::Continue => signals::request_continue(ctx)?,
                ActionKind::Loop(loop_action) => {
                    let report = LoopExecutor::execute(&action.id, loop_action, form, ctx, self).await?;
                    debug!(
                        "loop {} finished: {} ({} iterations)",
                        action.id, report.phase, report.iterations_completed
                    );
                }
            }
        }
        Ok(())
    }
}
