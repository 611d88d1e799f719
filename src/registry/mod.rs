//! Static variable collection.
//!
//! Walks a form definition and enumerates every variable a template or
//! condition could reference, with enough provenance for authoring tools to
//! point back at the owning field or action. Nested loop bodies are reached
//! exclusively through the form's action-group index, visited at most once
//! per group id, so self-referencing loops terminate.

pub mod conflict;
pub mod ident;

use std::collections::HashSet;

use serde::Serialize;

use crate::form::{ActionKind, FormAction, FormConfig};

pub use conflict::{ConflictDetector, ConflictInfo, ConflictType, LoopVariableSlot};

/// Loop-variable names reserved by the engine's default aliases.
pub const SYSTEM_RESERVED_LOOP_VARIABLES: [&str; 3] = ["item", "index", "total"];

/// Internal template variables the engine always provides.
pub const INTERNAL_TEMPLATE_VARIABLES: [(&str, &str); 5] = [
    ("date", "Current date"),
    ("time", "Current time"),
    ("random", "Random number"),
    ("selection", "Editor selection at submit time"),
    ("clipboard", "Clipboard content at submit time"),
];

/// Where a variable comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableSource {
    FormField,
    LoopVar,
    SuggestModal,
    AiOutput,
    Internal,
    SystemReserved,
}

/// Structured path back to the entity that owns a variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    /// Set when the owner lives inside a loop body group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_group_id: Option<String>,
}

/// One variable known to the form, with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub source: VariableSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: VariableLocation,
    pub is_reserved: bool,
}

impl VariableInfo {
    fn new(name: impl Into<String>, source: VariableSource) -> Self {
        Self {
            name: name.into(),
            source,
            source_id: None,
            description: None,
            location: VariableLocation::default(),
            is_reserved: false,
        }
    }
}

/// Options controlling which variable groups are collected.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    /// Include the fixed internal template variables (date/time/...).
    pub include_internal: bool,
    /// Include the system-reserved loop-variable names.
    pub include_reserved: bool,
    /// Keep entries with blank names instead of dropping them.
    pub include_empty: bool,
}

impl CollectOptions {
    /// Everything an authoring conflict check needs: user variables plus
    /// both builtin sets.
    pub fn with_builtins() -> Self {
        Self {
            include_internal: true,
            include_reserved: true,
            include_empty: false,
        }
    }
}

/// Static variable registry over a form definition.
pub struct VariableRegistry;

impl VariableRegistry {
    /// Enumerate every variable the form defines.
    pub fn collect_all_variables(form: &FormConfig, options: CollectOptions) -> Vec<VariableInfo> {
        let mut out = Vec::new();

        for field in &form.fields {
            let mut info = VariableInfo::new(field.label.clone(), VariableSource::FormField);
            info.source_id = Some(field.id.clone());
            info.description = field.description.clone();
            info.location.field_id = Some(field.id.clone());
            out.push(info);
        }

        let mut visited_groups = HashSet::new();
        Self::collect_from_actions(form, &form.actions, None, &mut visited_groups, &mut out);

        if options.include_internal {
            for (name, description) in INTERNAL_TEMPLATE_VARIABLES {
                let mut info = VariableInfo::new(name, VariableSource::Internal);
                info.description = Some(description.to_string());
                info.is_reserved = true;
                out.push(info);
            }
        }

        if options.include_reserved {
            for name in SYSTEM_RESERVED_LOOP_VARIABLES {
                let mut info = VariableInfo::new(name, VariableSource::SystemReserved);
                info.description = Some("Reserved loop variable".to_string());
                info.is_reserved = true;
                out.push(info);
            }
        }

        if !options.include_empty {
            out.retain(|info| !info.name.trim().is_empty());
        }
        out
    }

    /// Walk one action sequence, recursing into loop bodies through the
    /// form's group index. `visited_groups` guarantees each group is
    /// expanded once, which is what terminates self-referencing loops.
    fn collect_from_actions(
        form: &FormConfig,
        actions: &[FormAction],
        group_id: Option<&str>,
        visited_groups: &mut HashSet<String>,
        out: &mut Vec<VariableInfo>,
    ) {
        for action in actions {
            match &action.kind {
                ActionKind::Loop(loop_action) => {
                    let slot_descriptions = [
                        (loop_action.config.item_variable_name.as_str(), "Current loop element"),
                        (loop_action.config.index_variable_name.as_str(), "Zero-based loop index"),
                        (loop_action.config.total_variable_name.as_str(), "Total iteration count"),
                    ];
                    for (name, description) in slot_descriptions {
                        out.push(Self::loop_var(name, description, action, group_id));
                    }
                    let extras = [
                        (&loop_action.config.current_page_variable, "Current page number"),
                        (&loop_action.config.page_size_variable, "Page size"),
                        (&loop_action.config.total_page_variable, "Total page count"),
                        (&loop_action.config.total_items_variable, "Total item count"),
                    ];
                    for (alias, description) in extras {
                        if let Some(name) = alias {
                            out.push(Self::loop_var(name, description, action, group_id));
                        }
                    }

                    if visited_groups.insert(loop_action.body_group_id.clone())
                        && let Some(group) = form.action_group(&loop_action.body_group_id)
                    {
                        Self::collect_from_actions(
                            form,
                            &group.actions,
                            Some(&group.id),
                            visited_groups,
                            out,
                        );
                    }
                }
                ActionKind::AiRequest { output_variable, .. } => {
                    let mut info = VariableInfo::new(output_variable.clone(), VariableSource::AiOutput);
                    info.source_id = Some(action.id.clone());
                    info.description = Some("AI action output".to_string());
                    info.location.action_id = Some(action.id.clone());
                    info.location.action_group_id = group_id.map(str::to_string);
                    out.push(info);
                }
                ActionKind::SuggestModal { fields } => {
                    for field in fields {
                        let mut info = VariableInfo::new(field.label.clone(), VariableSource::SuggestModal);
                        info.source_id = Some(field.id.clone());
                        info.description = field.description.clone();
                        info.location.field_id = Some(field.id.clone());
                        info.location.action_id = Some(action.id.clone());
                        info.location.action_group_id = group_id.map(str::to_string);
                        out.push(info);
                    }
                }
                ActionKind::Break | ActionKind::Continue | ActionKind::Basic { .. } => {}
            }
        }
    }

    fn loop_var(
        name: &str,
        description: &str,
        action: &FormAction,
        group_id: Option<&str>,
    ) -> VariableInfo {
        let mut info = VariableInfo::new(name, VariableSource::LoopVar);
        info.source_id = Some(action.id.clone());
        info.description = Some(description.to_string());
        info.location.action_id = Some(action.id.clone());
        info.location.action_group_id = group_id.map(str::to_string);
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoopConfig, LoopType};
    use crate::form::{ActionGroup, FieldType, FormField, LoopAction};
    use std::collections::HashMap;

    fn field(id: &str, label: &str) -> FormField {
        FormField {
            id: id.to_string(),
            label: label.to_string(),
            field_type: FieldType::Text,
            description: None,
        }
    }

    fn loop_action(id: &str, body_group_id: &str) -> FormAction {
        FormAction {
            id: id.to_string(),
            name: None,
            kind: ActionKind::Loop(LoopAction {
                config: LoopConfig::new(LoopType::List),
                body_group_id: body_group_id.to_string(),
            }),
        }
    }

    fn form_with(actions: Vec<FormAction>, groups: Vec<ActionGroup>) -> FormConfig {
        FormConfig {
            id: "f".to_string(),
            title: "test".to_string(),
            fields: vec![field("f1", "title"), field("f2", "body")],
            actions,
            action_groups: groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
        }
    }

    #[test]
    fn test_collect_fields() {
        let form = form_with(vec![], vec![]);
        let vars = VariableRegistry::collect_all_variables(&form, CollectOptions::default());
        assert_eq!(vars.len(), 2);
        assert!(vars.iter().all(|v| v.source == VariableSource::FormField));
        assert_eq!(vars[0].name, "title");
        assert_eq!(vars[0].location.field_id.as_deref(), Some("f1"));
    }

    #[test]
    fn test_collect_loop_slots_with_aliases() {
        let mut config = LoopConfig::new(LoopType::List);
        config.item_variable_name = "note".to_string();
        let action = FormAction {
            id: "a1".to_string(),
            name: None,
            kind: ActionKind::Loop(LoopAction {
                config,
                body_group_id: "body".to_string(),
            }),
        };
        let form = form_with(
            vec![action],
            vec![ActionGroup { id: "body".to_string(), actions: vec![] }],
        );

        let vars = VariableRegistry::collect_all_variables(&form, CollectOptions::default());
        let loop_vars: Vec<&str> = vars
            .iter()
            .filter(|v| v.source == VariableSource::LoopVar)
            .map(|v| v.name.as_str())
            .collect();
        // Aliases, not the literal defaults.
        assert_eq!(loop_vars, vec!["note", "index", "total"]);
    }

    #[test]
    fn test_collect_nested_body_variables() {
        let body = ActionGroup {
            id: "body".to_string(),
            actions: vec![FormAction {
                id: "a2".to_string(),
                name: None,
                kind: ActionKind::AiRequest {
                    prompt: "p".to_string(),
                    output_variable: "summary".to_string(),
                },
            }],
        };
        let form = form_with(vec![loop_action("a1", "body")], vec![body]);

        let vars = VariableRegistry::collect_all_variables(&form, CollectOptions::default());
        let ai = vars.iter().find(|v| v.source == VariableSource::AiOutput).unwrap();
        assert_eq!(ai.name, "summary");
        assert_eq!(ai.location.action_group_id.as_deref(), Some("body"));
    }

    #[test]
    fn test_self_referencing_loop_terminates() {
        // A loop whose body contains a loop pointing back at the same group.
        let body = ActionGroup {
            id: "body".to_string(),
            actions: vec![loop_action("a2", "body")],
        };
        let form = form_with(vec![loop_action("a1", "body")], vec![body]);

        let vars = VariableRegistry::collect_all_variables(&form, CollectOptions::default());
        // Both loops contribute slots; the group itself expands once.
        let loop_vars = vars.iter().filter(|v| v.source == VariableSource::LoopVar).count();
        assert_eq!(loop_vars, 6);
    }

    #[test]
    fn test_internal_and_reserved_sets() {
        let form = form_with(vec![], vec![]);
        let vars = VariableRegistry::collect_all_variables(&form, CollectOptions::with_builtins());

        assert!(vars.iter().any(|v| v.name == "date" && v.source == VariableSource::Internal));
        assert!(vars.iter().any(|v| v.name == "clipboard" && v.is_reserved));
        assert!(
            vars.iter()
                .any(|v| v.name == "item" && v.source == VariableSource::SystemReserved)
        );
    }

    #[test]
    fn test_blank_names_excluded_by_default() {
        let mut form = form_with(vec![], vec![]);
        form.fields.push(field("f3", "  "));

        let vars = VariableRegistry::collect_all_variables(&form, CollectOptions::default());
        assert_eq!(vars.len(), 2);

        let vars = VariableRegistry::collect_all_variables(
            &form,
            CollectOptions { include_empty: true, ..Default::default() },
        );
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_suggest_modal_fields_collected() {
        let action = FormAction {
            id: "a1".to_string(),
            name: None,
            kind: ActionKind::SuggestModal {
                fields: vec![field("g1", "generated")],
            },
        };
        let form = form_with(vec![action], vec![]);
        let vars = VariableRegistry::collect_all_variables(&form, CollectOptions::default());
        let modal = vars.iter().find(|v| v.source == VariableSource::SuggestModal).unwrap();
        assert_eq!(modal.name, "generated");
        assert_eq!(modal.location.action_id.as_deref(), Some("a1"));
    }
}
