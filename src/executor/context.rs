//! Execution context threaded through a running form.
//!
//! Owns the pieces nested action dispatch reads and the loop executor
//! mutates: the form state, the loop-variable scope stack, the chain of
//! active loop contexts and the cooperative cancellation flag. One context
//! per form execution; nothing here is process-global.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::config::LoopConfig;
use crate::form::FormState;
use crate::resolver::condition::VariableBindings;
use crate::scope::LoopVariableScope;

/// Cooperative cancellation handle, cloneable across the dispatcher seam.
/// The loop executor observes it between iterations at minimum.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-loop execution context, alive from the loop action's first iteration
/// round until the action completes. The contexts form a stack mirroring
/// the scope stack; the enclosing loop is the previous entry.
#[derive(Debug, Clone)]
pub struct LoopContext {
    /// Id of the owning loop action.
    pub action_id: String,
    /// Nesting depth, 0 for an outermost loop.
    pub depth: usize,
    pub can_break: bool,
    pub can_continue: bool,
    /// Set by a break action; the executor resets it when it unwinds.
    pub break_requested: bool,
    /// Set by a continue action; the executor resets it when it unwinds.
    pub continue_requested: bool,
    /// Variable names this loop binds per iteration.
    pub variables: Vec<String>,
}

impl LoopContext {
    /// Context for a loop action about to start iterating.
    pub fn new(action_id: &str, config: &LoopConfig) -> Self {
        Self {
            action_id: action_id.to_string(),
            depth: 0,
            can_break: true,
            can_continue: true,
            break_requested: false,
            continue_requested: false,
            variables: config.variable_slots().iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Mutable execution context for one form run.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    /// Key-value store for field submissions and action outputs.
    pub state: FormState,
    /// Loop-variable scope stack, one frame per active iteration.
    pub scope: LoopVariableScope,
    /// Host-provided values for the `selection`/`clipboard` builtins.
    pub host_values: HashMap<String, Value>,
    /// Text produced by dispatched basic actions, in execution order.
    pub outputs: Vec<String>,
    loops: Vec<LoopContext>,
    cancel: CancelFlag,
}

impl ExecutionContext {
    pub fn new(state: FormState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    /// Handle the host can use to cancel this execution.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Enter a loop action: push its context onto the chain.
    pub fn push_loop(&mut self, mut loop_context: LoopContext) {
        loop_context.depth = self.loops.len();
        self.loops.push(loop_context);
    }

    /// Leave a loop action. Returns the discarded context.
    pub fn pop_loop(&mut self) -> Option<LoopContext> {
        self.loops.pop()
    }

    /// The innermost active loop, if any.
    pub fn current_loop(&self) -> Option<&LoopContext> {
        self.loops.last()
    }

    pub fn current_loop_mut(&mut self) -> Option<&mut LoopContext> {
        self.loops.last_mut()
    }

    /// Number of active loop contexts.
    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    pub fn is_inside_loop(&self) -> bool {
        !self.loops.is_empty()
    }
}

impl VariableBindings for ExecutionContext {
    /// Condition-expression name resolution: the `loop.` namespace reads
    /// the scope explicitly, a bare name tries the scope first, and
    /// anything else resolves as a dotted path into form state.
    fn resolve(&self, path: &str) -> Option<Value> {
        if let Some(name) = path.strip_prefix("loop.") {
            return self.scope.get_value(name).cloned();
        }
        if let Some(value) = self.scope.get_value(path) {
            return Some(value.clone());
        }
        self.state.get_path(path).cloned()
    }
}
