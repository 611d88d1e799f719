//! Per-loop-action configuration.
//!
//! This is the persisted shape of a loop action inside a form definition.
//! Field names are camelCase on the wire to match the host form format.

use serde::{Deserialize, Serialize};

use crate::registry::ident::is_valid_variable_name;

/// What a loop iterates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoopType {
    /// A list resolved from a data-source reference.
    List,
    /// An inclusive numeric range.
    Count,
    /// Re-evaluated boolean condition, while-style.
    Condition,
    /// Page-by-page over an external paginated source.
    Pagination,
}

impl std::fmt::Display for LoopType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopType::List => "LIST",
            LoopType::Count => "COUNT",
            LoopType::Condition => "CONDITION",
            LoopType::Pagination => "PAGINATION",
        };
        write!(f, "{}", name)
    }
}

/// Policy applied when a loop body iteration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorHandlingStrategy {
    /// Propagate the error and terminate the loop.
    #[default]
    Stop,
    /// Record the failure and advance to the next iteration.
    Continue,
    /// Re-run the failed iteration, then fall back to Stop semantics.
    Retry,
}

/// Configuration for a single loop action.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    /// Loop kind; decides which of the kind-specific fields apply.
    pub loop_type: LoopType,

    /// LIST: data-source reference (JSON array literal, state path, or
    /// comma/newline-separated text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_data_source: Option<String>,

    /// COUNT: inclusive start of the range.
    #[serde(default)]
    pub count_start: i64,

    /// COUNT: inclusive end of the range.
    #[serde(default)]
    pub count_end: i64,

    /// COUNT: step magnitude; direction is inferred from the endpoints.
    #[serde(default = "default_count_step")]
    pub count_step: i64,

    /// CONDITION: continuation predicate, re-evaluated before each round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,

    /// PAGINATION: scope variable holding the current page number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page_variable: Option<String>,

    /// PAGINATION: predicate evaluated after each page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_next_page_condition: Option<String>,

    /// PAGINATION: optional scope variable holding the page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size_variable: Option<String>,

    /// PAGINATION: optional scope variable holding the total page count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_page_variable: Option<String>,

    /// PAGINATION: optional scope variable holding the total item count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items_variable: Option<String>,

    /// PAGINATION: delay between page rounds, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_interval_ms: Option<u64>,

    /// PAGINATION: cap on page rounds, independent of max_iterations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,

    /// Alias for the per-iteration element value.
    #[serde(default = "default_item_variable")]
    pub item_variable_name: String,

    /// Alias for the per-iteration zero-based index.
    #[serde(default = "default_index_variable")]
    pub index_variable_name: String,

    /// Alias for the total iteration count (when known up front).
    #[serde(default = "default_total_variable")]
    pub total_variable_name: String,

    /// Hard safety cap on iteration rounds.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Whole-loop timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Per-iteration timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_iteration_timeout_ms: Option<u64>,

    /// What to do when a body iteration fails.
    #[serde(default)]
    pub error_handling_strategy: ErrorHandlingStrategy,

    /// RETRY: additional attempts per failed iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    /// RETRY: delay between attempts, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

fn default_count_step() -> i64 {
    1
}

fn default_item_variable() -> String {
    super::DEFAULT_ITEM_VARIABLE.to_string()
}

fn default_index_variable() -> String {
    super::DEFAULT_INDEX_VARIABLE.to_string()
}

fn default_total_variable() -> String {
    super::DEFAULT_TOTAL_VARIABLE.to_string()
}

fn default_max_iterations() -> u32 {
    super::DEFAULT_MAX_ITERATIONS
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            loop_type: LoopType::List,
            list_data_source: None,
            count_start: 0,
            count_end: 0,
            count_step: 1,
            condition_expression: None,
            current_page_variable: None,
            has_next_page_condition: None,
            page_size_variable: None,
            total_page_variable: None,
            total_items_variable: None,
            request_interval_ms: None,
            max_pages: None,
            item_variable_name: default_item_variable(),
            index_variable_name: default_index_variable(),
            total_variable_name: default_total_variable(),
            max_iterations: default_max_iterations(),
            timeout_ms: None,
            single_iteration_timeout_ms: None,
            error_handling_strategy: ErrorHandlingStrategy::Stop,
            retry_count: None,
            retry_delay_ms: None,
        }
    }
}

impl LoopConfig {
    /// Create a config for the given loop kind with default aliases.
    pub fn new(loop_type: LoopType) -> Self {
        Self {
            loop_type,
            ..Default::default()
        }
    }

    /// The user-configured variable aliases this loop binds per iteration,
    /// in slot order (item, index, total, then pagination extras).
    pub fn variable_slots(&self) -> Vec<&str> {
        let mut slots = vec![
            self.item_variable_name.as_str(),
            self.index_variable_name.as_str(),
            self.total_variable_name.as_str(),
        ];
        for extra in [
            &self.current_page_variable,
            &self.page_size_variable,
            &self.total_page_variable,
            &self.total_items_variable,
        ]
        .into_iter()
        .flatten()
        {
            slots.push(extra.as_str());
        }
        slots
    }

    /// Validate the configuration.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.max_iterations == 0 {
            eyre::bail!("max_iterations must be > 0");
        }
        match self.loop_type {
            LoopType::List => {
                if self.list_data_source.as_deref().unwrap_or("").is_empty() {
                    eyre::bail!("LIST loop requires list_data_source");
                }
            }
            LoopType::Count => {
                if self.count_step == 0 {
                    eyre::bail!("count_step must not be 0");
                }
            }
            LoopType::Condition => {
                if self.condition_expression.as_deref().unwrap_or("").is_empty() {
                    eyre::bail!("CONDITION loop requires condition_expression");
                }
            }
            LoopType::Pagination => {
                if self.has_next_page_condition.as_deref().unwrap_or("").is_empty() {
                    eyre::bail!("PAGINATION loop requires has_next_page_condition");
                }
            }
        }
        for alias in self.variable_slots() {
            if !is_valid_variable_name(alias) {
                eyre::bail!("invalid loop variable name: {:?}", alias);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_loop_config() {
        let config = LoopConfig::default();
        assert_eq!(config.loop_type, LoopType::List);
        assert_eq!(config.item_variable_name, "item");
        assert_eq!(config.index_variable_name, "index");
        assert_eq!(config.total_variable_name, "total");
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.count_step, 1);
        assert_eq!(config.error_handling_strategy, ErrorHandlingStrategy::Stop);
    }

    #[test]
    fn test_new_loop_config() {
        let config = LoopConfig::new(LoopType::Count);
        assert_eq!(config.loop_type, LoopType::Count);
    }

    #[test]
    fn test_validate_count_loop() {
        let mut config = LoopConfig::new(LoopType::Count);
        config.count_start = 0;
        config.count_end = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_zero_step() {
        let mut config = LoopConfig::new(LoopType::Count);
        config.count_step = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_zero_max_iterations() {
        let mut config = LoopConfig::new(LoopType::Count);
        config.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_list_loop_requires_source() {
        let config = LoopConfig::new(LoopType::List);
        assert!(config.validate().is_err());

        let config = LoopConfig {
            list_data_source: Some("a, b, c".to_string()),
            ..LoopConfig::new(LoopType::List)
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_condition_loop_requires_expression() {
        let config = LoopConfig::new(LoopType::Condition);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pagination_loop_requires_condition() {
        let config = LoopConfig::new(LoopType::Pagination);
        assert!(config.validate().is_err());

        let config = LoopConfig {
            has_next_page_condition: Some("{{hasMore}} === true".to_string()),
            ..LoopConfig::new(LoopType::Pagination)
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_variable_alias() {
        let mut config = LoopConfig::new(LoopType::Count);
        config.item_variable_name = "1bad".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_variable_slots_default() {
        let config = LoopConfig::default();
        assert_eq!(config.variable_slots(), vec!["item", "index", "total"]);
    }

    #[test]
    fn test_variable_slots_pagination() {
        let config = LoopConfig {
            current_page_variable: Some("page".to_string()),
            page_size_variable: Some("pageSize".to_string()),
            total_page_variable: Some("totalPages".to_string()),
            total_items_variable: Some("totalItems".to_string()),
            ..LoopConfig::new(LoopType::Pagination)
        };
        assert_eq!(
            config.variable_slots(),
            vec!["item", "index", "total", "page", "pageSize", "totalPages", "totalItems"]
        );
    }

    #[test]
    fn test_serde_camel_case_round_trip() {
        let yaml = r#"
loopType: COUNT
countStart: 1
countEnd: 10
countStep: 2
errorHandlingStrategy: RETRY
retryCount: 3
"#;
        let config: LoopConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.loop_type, LoopType::Count);
        assert_eq!(config.count_start, 1);
        assert_eq!(config.count_end, 10);
        assert_eq!(config.count_step, 2);
        assert_eq!(config.error_handling_strategy, ErrorHandlingStrategy::Retry);
        assert_eq!(config.retry_count, Some(3));
        assert_eq!(config.max_iterations, 1000);
    }
}
