//! Loop-variable scope stack.
//!
//! One frame per active loop iteration; the innermost frame wins on lookup
//! (shadowing). The stack is an explicit object owned by the execution
//! context and threaded to whoever needs lookup. There is no process-wide
//! singleton, so concurrent form executions cannot interfere.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{FormloopError, Result};

/// A single stack level of loop-variable bindings, live for one iteration.
pub type ScopeFrame = HashMap<String, Value>;

/// Metadata describing one available variable, for authoring UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableMeta {
    pub name: String,
    pub description: String,
}

/// Stack of loop-variable frames with innermost-first lookup.
#[derive(Debug, Clone, Default)]
pub struct LoopVariableScope {
    frames: Vec<ScopeFrame>,
}

impl LoopVariableScope {
    /// Create an empty scope stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame onto the top of the stack.
    pub fn push(&mut self, frame: ScopeFrame) {
        self.frames.push(frame);
    }

    /// Pop the top frame. Popping an empty stack is a programmer error in
    /// the executor's push/pop discipline, not a condition to ignore.
    pub fn pop(&mut self) -> Result<ScopeFrame> {
        self.frames.pop().ok_or(FormloopError::ScopeUnderflow)
    }

    /// Look a name up, scanning frames top-to-bottom. An inner binding
    /// shadows any outer binding of the same name; the outer value is
    /// untouched and reappears once the inner frame pops.
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Bind a name in the top frame. Errors when no frame is active.
    pub fn set_value(&mut self, name: impl Into<String>, value: Value) -> Result<()> {
        let frame = self.frames.last_mut().ok_or(FormloopError::ScopeUnderflow)?;
        frame.insert(name.into(), value);
        Ok(())
    }

    /// Empty the stack. Used at session boundaries and by tests.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// True iff at least one loop iteration is active.
    pub fn is_inside_loop(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// All names currently visible, innermost binding first, deduplicated.
    pub fn get_available_variables(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for frame in self.frames.iter().rev() {
            let mut names: Vec<&String> = frame.keys().collect();
            names.sort();
            for name in names {
                if !seen.contains(name) {
                    seen.push(name.clone());
                }
            }
        }
        seen
    }

    /// Human-readable description of a visible variable's current value.
    pub fn get_variable_description(&self, name: &str) -> Option<String> {
        self.get_value(name).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Build authoring-UI metadata for a set of variable names. Pure; does
    /// not touch the stack beyond lookups.
    pub fn create_standard_variable_meta(&self, names: &[&str]) -> Vec<VariableMeta> {
        names
            .iter()
            .map(|name| VariableMeta {
                name: (*name).to_string(),
                description: self
                    .get_variable_description(name)
                    .unwrap_or_else(|| "not bound in the current loop".to_string()),
            })
            .collect()
    }
}
