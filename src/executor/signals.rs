//! Break/continue action semantics.
//!
//! A control action has a dual contract: it marks the matching flag on the
//! innermost loop context and returns the dedicated [`FormloopError::Signal`]
//! error so the dispatch chain unwinds to the owning loop executor. Outside
//! any loop context (or inside one that forbids it) the same call is an
//! authoring mistake and fails with a usage error instead.

use crate::error::{FormloopError, LoopSignal, Result};

use super::context::ExecutionContext;

/// Execute a break action. Always returns `Err`: the signal inside a loop,
/// the usage error outside one.
pub fn request_break(ctx: &mut ExecutionContext) -> Result<()> {
    match ctx.current_loop_mut() {
        Some(loop_ctx) if loop_ctx.can_break => {
            loop_ctx.break_requested = true;
            Err(FormloopError::Signal(LoopSignal::Break))
        }
        _ => Err(FormloopError::ControlOutsideLoop {
            signal: LoopSignal::Break,
        }),
    }
}

/// Execute a continue action. Same dual contract as [`request_break`].
pub fn request_continue(ctx: &mut ExecutionContext) -> Result<()> {
    match ctx.current_loop_mut() {
        Some(loop_ctx) if loop_ctx.can_continue => {
            loop_ctx.continue_requested = true;
            Err(FormloopError::Signal(LoopSignal::Continue))
        }
        _ => Err(FormloopError::ControlOutsideLoop {
            signal: LoopSignal::Continue,
        }),
    }
}
