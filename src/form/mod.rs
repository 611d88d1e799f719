//! Form definition model.
//!
//! A form is an ordered list of fields plus an ordered list of actions.
//! Loop actions do not nest their body actions inline: the body lives in a
//! named action group on the form, and the loop references it by id. All
//! traversal of nested bodies goes through that index, which is what keeps
//! static analysis terminating on self-referencing loops.

pub mod state;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::LoopConfig;
use crate::error::{FormloopError, Result};

pub use state::FormState;

/// Input field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Toggle,
    Date,
    Select,
}

/// A single form input field. The field's label is its variable name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A loop action: configuration plus a reference to its body group.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopAction {
    #[serde(flatten)]
    pub config: LoopConfig,
    /// Id of the action group holding the nested action sequence.
    pub body_group_id: String,
}

/// What an action does when executed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionKind {
    /// Repeat a nested action sequence.
    Loop(LoopAction),
    /// AI request whose response is bound to an output variable.
    #[serde(rename_all = "camelCase")]
    AiRequest { prompt: String, output_variable: String },
    /// Open a sub-form suggestion modal that generates extra fields.
    SuggestModal { fields: Vec<FormField> },
    /// Break out of the enclosing loop.
    Break,
    /// Skip to the next iteration of the enclosing loop.
    Continue,
    /// Any other host-dispatched action (insert text, save file, ...).
    #[serde(rename_all = "camelCase")]
    Basic {
        action_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
    },
}

/// One entry in a form's action sequence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormAction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

/// A named, reusable action sequence (loop bodies live here).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionGroup {
    pub id: String,
    pub actions: Vec<FormAction>,
}

/// A complete form definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
    #[serde(default)]
    pub actions: Vec<FormAction>,
    /// Index of nested action sequences, keyed by group id.
    #[serde(default)]
    pub action_groups: HashMap<String, ActionGroup>,
}

impl FormConfig {
    /// Look up an action group by id.
    pub fn action_group(&self, group_id: &str) -> Option<&ActionGroup> {
        self.action_groups.get(group_id)
    }

    /// Look up an action group, erroring with context when missing.
    pub fn require_action_group(&self, group_id: &str) -> Result<&ActionGroup> {
        self.action_group(group_id)
            .ok_or_else(|| FormloopError::Form(format!("unknown action group: {}", group_id)))
    }

    /// Parse a form definition from YAML.
    pub fn from_yaml(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }
}
