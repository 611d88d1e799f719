//! Variable conflict detection.
//!
//! Consumes the registry's output (or an ad hoc candidate typed into an
//! authoring panel) and classifies name collisions. Detection never fails:
//! findings are data for the UI to surface as warnings.
//!
//! Classification treats each owning entity as a scope: the form's fields
//! are one scope, each loop action is its own. A collision inside one scope
//! is a DUPLICATE; across scopes it is CROSS_SCOPE; anything touching a
//! reserved or internal name is RESERVED; a loop action whose own variable
//! slots collide with each other is SELF_CONFLICT.

use serde::Serialize;

use crate::config::LoopConfig;
use crate::form::{ActionKind, FormConfig};

use super::{CollectOptions, VariableInfo, VariableLocation, VariableRegistry, VariableSource};

/// How a group of same-named variables collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Collision within one scope (e.g. two fields with the same label).
    Duplicate,
    /// Collision with a system or internal name.
    Reserved,
    /// Collision across different variable sources.
    CrossScope,
    /// A loop action's own variable slots used as each other's values.
    SelfConflict,
}

impl ConflictType {
    fn message_key(&self) -> &'static str {
        match self {
            ConflictType::Duplicate => "conflict.duplicate",
            ConflictType::Reserved => "conflict.reserved",
            ConflictType::CrossScope => "conflict.crossScope",
            ConflictType::SelfConflict => "conflict.selfConflict",
        }
    }
}

/// One classified collision, with the colliding entries and a way out.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictInfo {
    pub variable_name: String,
    pub conflict_type: ConflictType,
    /// The variables participating in the collision.
    pub items: Vec<VariableInfo>,
    /// A name known not to collide with anything collected.
    pub suggestion: String,
    /// i18n key for the authoring UI's warning text.
    pub message_key: String,
}

impl ConflictInfo {
    fn new(
        name: &str,
        conflict_type: ConflictType,
        items: Vec<VariableInfo>,
        known_names: &[String],
    ) -> Self {
        Self {
            variable_name: name.to_string(),
            conflict_type,
            items,
            suggestion: suggest_name(name, known_names),
            message_key: conflict_type.message_key().to_string(),
        }
    }
}

/// Which of a loop action's variable slots a candidate name is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVariableSlot {
    Item,
    Index,
    Total,
    CurrentPage,
    PageSize,
    TotalPages,
    TotalItems,
}

impl LoopVariableSlot {
    /// Current alias bound to this slot, if the config sets one.
    fn current_value<'a>(&self, config: &'a LoopConfig) -> Option<&'a str> {
        match self {
            LoopVariableSlot::Item => Some(config.item_variable_name.as_str()),
            LoopVariableSlot::Index => Some(config.index_variable_name.as_str()),
            LoopVariableSlot::Total => Some(config.total_variable_name.as_str()),
            LoopVariableSlot::CurrentPage => config.current_page_variable.as_deref(),
            LoopVariableSlot::PageSize => config.page_size_variable.as_deref(),
            LoopVariableSlot::TotalPages => config.total_page_variable.as_deref(),
            LoopVariableSlot::TotalItems => config.total_items_variable.as_deref(),
        }
    }

    fn all() -> [LoopVariableSlot; 7] {
        [
            LoopVariableSlot::Item,
            LoopVariableSlot::Index,
            LoopVariableSlot::Total,
            LoopVariableSlot::CurrentPage,
            LoopVariableSlot::PageSize,
            LoopVariableSlot::TotalPages,
            LoopVariableSlot::TotalItems,
        ]
    }
}

/// Deterministic non-colliding alternative: numeric suffix, first free wins.
fn suggest_name(base: &str, known_names: &[String]) -> String {
    for i in 1.. {
        let candidate = format!("{}_{}", base, i);
        if !known_names.iter().any(|name| name == &candidate) {
            return candidate;
        }
    }
    unreachable!("suffix space exhausted")
}

/// The scope a variable belongs to for cross-scope classification. Loop
/// variables are scoped to their owning action; everything else to its
/// source kind.
fn scope_key(info: &VariableInfo) -> String {
    match info.source {
        VariableSource::LoopVar => {
            format!("loop:{}", info.source_id.as_deref().unwrap_or(""))
        }
        VariableSource::FormField => "field".to_string(),
        VariableSource::SuggestModal => "modal".to_string(),
        VariableSource::AiOutput => "ai".to_string(),
        VariableSource::Internal => "internal".to_string(),
        VariableSource::SystemReserved => "reserved".to_string(),
    }
}

fn classify_group(items: &[VariableInfo]) -> ConflictType {
    if items.iter().any(|info| info.is_reserved) {
        return ConflictType::Reserved;
    }
    let first_scope = scope_key(&items[0]);
    if items.iter().any(|info| scope_key(info) != first_scope) {
        ConflictType::CrossScope
    } else {
        ConflictType::Duplicate
    }
}

/// Static conflict detector over registry output.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Group variables by trimmed name (case-sensitive) and classify every
    /// group with more than one member.
    pub fn detect_conflicts(variables: &[VariableInfo]) -> Vec<ConflictInfo> {
        let known_names: Vec<String> = variables.iter().map(|v| v.name.trim().to_string()).collect();

        // Group in first-seen order so findings are stable for the UI.
        let mut groups: Vec<(String, Vec<VariableInfo>)> = Vec::new();
        for info in variables {
            let normalized = info.name.trim().to_string();
            if normalized.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(name, _)| *name == normalized) {
                Some((_, members)) => members.push(info.clone()),
                None => groups.push((normalized, vec![info.clone()])),
            }
        }

        groups
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(name, members)| {
                let conflict_type = classify_group(&members);
                ConflictInfo::new(&name, conflict_type, members, &known_names)
            })
            .collect()
    }

    /// Check a field name while the user is typing it. The field's own
    /// current binding is excluded, so renaming a field to its existing
    /// name is never flagged.
    pub fn check_field_name_conflict(
        candidate: &str,
        field_id: &str,
        form: &FormConfig,
    ) -> Option<ConflictInfo> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }

        let all = VariableRegistry::collect_all_variables(form, CollectOptions::with_builtins());
        let known_names: Vec<String> = all.iter().map(|v| v.name.trim().to_string()).collect();

        let matches: Vec<VariableInfo> = all
            .into_iter()
            .filter(|info| info.location.field_id.as_deref() != Some(field_id))
            .filter(|info| info.name.trim() == candidate)
            .collect();
        if matches.is_empty() {
            return None;
        }

        let conflict_type = if matches.iter().any(|info| info.is_reserved) {
            ConflictType::Reserved
        } else if matches.iter().any(|info| scope_key(info) != "field") {
            ConflictType::CrossScope
        } else {
            ConflictType::Duplicate
        };
        Some(ConflictInfo::new(candidate, conflict_type, matches, &known_names))
    }

    /// Check a loop-variable alias while the user is typing it.
    ///
    /// The slot's own current binding is excluded. A collision with one of
    /// the same loop's sibling slots classifies as SELF_CONFLICT and wins
    /// over everything else. The system-reserved loop names are not part of
    /// the comparison set here: loop variables are the legitimate users of
    /// those names, and the engine's built-in round counter (`iteration`)
    /// is not reserved at all.
    pub fn check_loop_variable_conflict(
        candidate: &str,
        action_id: &str,
        slot: LoopVariableSlot,
        form: &FormConfig,
    ) -> Option<ConflictInfo> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }

        let config = find_loop_config(form, action_id)?;

        let siblings: Vec<(LoopVariableSlot, &str)> = LoopVariableSlot::all()
            .into_iter()
            .filter(|s| *s != slot)
            .filter_map(|s| s.current_value(config).map(|value| (s, value)))
            .collect();
        if let Some((_, sibling)) = siblings.iter().find(|(_, value)| value.trim() == candidate) {
            let mut info = VariableInfo::new(*sibling, VariableSource::LoopVar);
            info.source_id = Some(action_id.to_string());
            info.location = VariableLocation {
                action_id: Some(action_id.to_string()),
                ..Default::default()
            };
            let known: Vec<String> = config.variable_slots().iter().map(|s| s.to_string()).collect();
            return Some(ConflictInfo::new(
                candidate,
                ConflictType::SelfConflict,
                vec![info],
                &known,
            ));
        }

        let all = VariableRegistry::collect_all_variables(form, CollectOptions::with_builtins());
        let known_names: Vec<String> = all.iter().map(|v| v.name.trim().to_string()).collect();

        let own_scope = format!("loop:{}", action_id);
        let matches: Vec<VariableInfo> = all
            .into_iter()
            .filter(|info| info.source != VariableSource::SystemReserved)
            .filter(|info| scope_key(info) != own_scope)
            .filter(|info| info.name.trim() == candidate)
            .collect();
        if matches.is_empty() {
            return None;
        }

        let conflict_type = if matches.iter().any(|info| info.is_reserved) {
            ConflictType::Reserved
        } else {
            ConflictType::CrossScope
        };
        Some(ConflictInfo::new(candidate, conflict_type, matches, &known_names))
    }
}

fn find_loop_config<'a>(form: &'a FormConfig, action_id: &str) -> Option<&'a LoopConfig> {
    let direct = form.actions.iter();
    let nested = form.action_groups.values().flat_map(|group| group.actions.iter());
    direct.chain(nested).find_map(|action| match &action.kind {
        ActionKind::Loop(loop_action) if action.id == action_id => Some(&loop_action.config),
        _ => None,
    })
}
