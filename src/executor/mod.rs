//! Loop execution.
//!
//! The executor owns the per-loop state machine
//! (`Pending → Iterating → {Completed | StoppedByError | Broken}`), the
//! scope-frame lifecycle and the failure policy. Per iteration: push a
//! scope frame, run the nested action sequence through the dispatcher,
//! interpret the outcome, pop the frame. The frame pops on every exit path
//! (normal completion, continue, break, error, timeout) so the stack stays
//! balanced no matter how the body unwinds.

pub mod context;
pub mod dispatcher;
pub mod signals;

use std::time::Duration;

use log::{debug, warn};
use serde_json::json;
use tokio::time::Instant;

use crate::config::{ErrorHandlingStrategy, LoopConfig, LoopType};
use crate::error::{FormloopError, LoopSignal, Result};
use crate::form::{FormAction, FormConfig, LoopAction};
use crate::resolver::LoopDataResolver;
use crate::scope::ScopeFrame;

pub use context::{CancelFlag, ExecutionContext, LoopContext};
pub use dispatcher::{ActionDispatcher, LocalActionDispatcher};

/// Built-in per-round counter bound in every iteration frame. Not a loop
/// variable slot and not user-assignable.
pub const ITERATION_COUNTER_VARIABLE: &str = "iteration";

/// Additional attempts per failed iteration when the strategy is Retry and
/// the config does not set its own count.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// State machine phases of one loop action instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Pending,
    Iterating,
    Completed,
    StoppedByError,
    /// Terminated early by a break action; a successful completion.
    Broken,
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopPhase::Pending => "pending",
            LoopPhase::Iterating => "iterating",
            LoopPhase::Completed => "completed",
            LoopPhase::StoppedByError => "stopped-by-error",
            LoopPhase::Broken => "broken",
        };
        write!(f, "{}", name)
    }
}

/// What a finished loop run looked like.
#[derive(Debug, Clone)]
pub struct LoopRunReport {
    pub phase: LoopPhase,
    /// Iteration rounds that ran to completion (including continue-skipped
    /// rounds).
    pub iterations_completed: u32,
    /// Failures absorbed by the Continue and Retry strategies.
    pub failures: Vec<String>,
}

impl LoopRunReport {
    fn new() -> Self {
        Self {
            phase: LoopPhase::Pending,
            iterations_completed: 0,
            failures: Vec::new(),
        }
    }

    /// Whether the loop terminated successfully. A break counts: the loop
    /// decided to stop, it did not fail.
    pub fn completed(&self) -> bool {
        matches!(self.phase, LoopPhase::Completed | LoopPhase::Broken)
    }
}

/// How one iteration round resolved.
enum IterationOutcome {
    Advance,
    Break,
}

/// Executes loop actions against an execution context and a dispatcher.
pub struct LoopExecutor;

impl LoopExecutor {
    /// Run one loop action to termination.
    ///
    /// Errors propagate for stop-policy iteration failures, the
    /// max-iteration guard, loop timeout and cancellation; a report comes
    /// back for every successful termination including break.
    pub async fn execute(
        action_id: &str,
        loop_action: &LoopAction,
        form: &FormConfig,
        ctx: &mut ExecutionContext,
        dispatcher: &dyn ActionDispatcher,
    ) -> Result<LoopRunReport> {
        let config = &loop_action.config;
        config
            .validate()
            .map_err(|e| FormloopError::InvalidLoopConfig(e.to_string()))?;
        let body = form.require_action_group(&loop_action.body_group_id)?;

        let mut report = LoopRunReport::new();
        ctx.push_loop(LoopContext::new(action_id, config));
        let result = Self::run_rounds(config, &body.actions, form, ctx, dispatcher, &mut report).await;
        ctx.pop_loop();

        match result {
            Ok(()) => {
                debug!(
                    "loop {} {}: {} iterations, {} absorbed failures",
                    action_id,
                    report.phase,
                    report.iterations_completed,
                    report.failures.len()
                );
                Ok(report)
            }
            Err(e) => {
                report.phase = LoopPhase::StoppedByError;
                warn!("loop {} {}: {}", action_id, report.phase, e);
                Err(e)
            }
        }
    }

    async fn run_rounds(
        config: &LoopConfig,
        body: &[FormAction],
        form: &FormConfig,
        ctx: &mut ExecutionContext,
        dispatcher: &dyn ActionDispatcher,
        report: &mut LoopRunReport,
    ) -> Result<()> {
        report.phase = LoopPhase::Iterating;
        let started = Instant::now();

        match config.loop_type {
            LoopType::List | LoopType::Count => {
                let items = LoopDataResolver::resolve_iterations(config, ctx)?;
                let total = items.len();
                for (index, item) in items.into_iter().enumerate() {
                    Self::check_guards(config, index, started, ctx)?;
                    let mut frame = ScopeFrame::new();
                    frame.insert(config.item_variable_name.clone(), item);
                    frame.insert(config.index_variable_name.clone(), json!(index));
                    frame.insert(config.total_variable_name.clone(), json!(total));
                    frame.insert(ITERATION_COUNTER_VARIABLE.to_string(), json!(index + 1));

                    match Self::run_iteration(config, body, form, ctx, dispatcher, frame, report).await? {
                        IterationOutcome::Advance => {}
                        IterationOutcome::Break => {
                            report.phase = LoopPhase::Broken;
                            return Ok(());
                        }
                    }
                }
            }
            LoopType::Condition => {
                let expression = config.condition_expression.as_deref().unwrap_or_default();
                let mut index: usize = 0;
                loop {
                    Self::check_guards(config, index, started, ctx)?;
                    if !LoopDataResolver::evaluate_condition(expression, ctx) {
                        break;
                    }
                    let mut frame = ScopeFrame::new();
                    frame.insert(config.index_variable_name.clone(), json!(index));
                    frame.insert(ITERATION_COUNTER_VARIABLE.to_string(), json!(index + 1));

                    match Self::run_iteration(config, body, form, ctx, dispatcher, frame, report).await? {
                        IterationOutcome::Advance => index += 1,
                        IterationOutcome::Break => {
                            report.phase = LoopPhase::Broken;
                            return Ok(());
                        }
                    }
                }
            }
            LoopType::Pagination => {
                let expression = config.has_next_page_condition.as_deref().unwrap_or_default();
                let mut index: usize = 0;
                loop {
                    Self::check_guards(config, index, started, ctx)?;
                    let page = index as u64 + 1;
                    let mut frame = ScopeFrame::new();
                    frame.insert(config.index_variable_name.clone(), json!(index));
                    frame.insert(ITERATION_COUNTER_VARIABLE.to_string(), json!(page));
                    if let Some(page_variable) = &config.current_page_variable {
                        frame.insert(page_variable.clone(), json!(page));
                    }

                    match Self::run_iteration(config, body, form, ctx, dispatcher, frame, report).await? {
                        IterationOutcome::Advance => {}
                        IterationOutcome::Break => {
                            report.phase = LoopPhase::Broken;
                            return Ok(());
                        }
                    }

                    if let Some(max_pages) = config.max_pages
                        && page >= u64::from(max_pages)
                    {
                        debug!("pagination loop reached max_pages ({})", max_pages);
                        break;
                    }
                    // The page just fetched decides whether another exists.
                    if !Self::has_next_page(expression, config, page, ctx) {
                        break;
                    }
                    if let Some(interval) = config.request_interval_ms {
                        tokio::time::sleep(Duration::from_millis(interval)).await;
                    }
                    index += 1;
                }
            }
        }

        report.phase = LoopPhase::Completed;
        Ok(())
    }

    /// The has-next predicate runs after the frame is popped, so the page
    /// bindings are re-created for it to read.
    fn has_next_page(
        expression: &str,
        config: &LoopConfig,
        page: u64,
        ctx: &mut ExecutionContext,
    ) -> bool {
        let mut frame = ScopeFrame::new();
        if let Some(page_variable) = &config.current_page_variable {
            frame.insert(page_variable.clone(), json!(page));
        }
        ctx.scope.push(frame);
        let has_next = LoopDataResolver::evaluate_condition(expression, ctx);
        let _ = ctx.scope.pop();
        has_next
    }

    fn check_guards(
        config: &LoopConfig,
        index: usize,
        started: Instant,
        ctx: &ExecutionContext,
    ) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(FormloopError::Cancelled);
        }
        if index as u64 >= u64::from(config.max_iterations) {
            return Err(FormloopError::MaxIterationsExceeded {
                limit: config.max_iterations,
            });
        }
        if let Some(ms) = config.timeout_ms
            && started.elapsed() >= Duration::from_millis(ms)
        {
            return Err(FormloopError::LoopTimeout { ms });
        }
        Ok(())
    }

    /// One iteration round, including retries. Pushes the frame, runs the
    /// body, pops the frame, interprets the outcome.
    async fn run_iteration(
        config: &LoopConfig,
        body: &[FormAction],
        form: &FormConfig,
        ctx: &mut ExecutionContext,
        dispatcher: &dyn ActionDispatcher,
        frame: ScopeFrame,
        report: &mut LoopRunReport,
    ) -> Result<IterationOutcome> {
        let max_attempts = match config.error_handling_strategy {
            ErrorHandlingStrategy::Retry => 1 + config.retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
            _ => 1,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            ctx.scope.push(frame.clone());
            let dispatched = Self::dispatch_body(config, body, form, ctx, dispatcher).await;
            ctx.scope.pop()?;

            match dispatched {
                Ok(()) => {
                    report.iterations_completed += 1;
                    return Ok(IterationOutcome::Advance);
                }
                Err(FormloopError::Signal(LoopSignal::Continue)) => {
                    if let Some(loop_ctx) = ctx.current_loop_mut() {
                        loop_ctx.continue_requested = false;
                    }
                    report.iterations_completed += 1;
                    return Ok(IterationOutcome::Advance);
                }
                Err(FormloopError::Signal(LoopSignal::Break)) => {
                    if let Some(loop_ctx) = ctx.current_loop_mut() {
                        loop_ctx.break_requested = false;
                    }
                    return Ok(IterationOutcome::Break);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => match config.error_handling_strategy {
                    ErrorHandlingStrategy::Stop => return Err(e),
                    ErrorHandlingStrategy::Continue => {
                        warn!("iteration failed, continuing: {}", e);
                        report.failures.push(e.to_string());
                        return Ok(IterationOutcome::Advance);
                    }
                    ErrorHandlingStrategy::Retry => {
                        report.failures.push(format!("attempt {}: {}", attempt, e));
                        if attempt >= max_attempts {
                            return Err(e);
                        }
                        warn!("iteration failed, retrying ({}/{}): {}", attempt, max_attempts, e);
                        if let Some(delay) = config.retry_delay_ms {
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                    }
                },
            }
        }
    }

    async fn dispatch_body(
        config: &LoopConfig,
        body: &[FormAction],
        form: &FormConfig,
        ctx: &mut ExecutionContext,
        dispatcher: &dyn ActionDispatcher,
    ) -> Result<()> {
        match config.single_iteration_timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), dispatcher.dispatch(body, form, ctx))
                .await
                .map_err(|_| FormloopError::IterationTimeout { ms })?,
            None => dispatcher.dispatch(body, form, ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{ActionGroup, ActionKind};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn loop_form(config: LoopConfig, body: Vec<FormAction>) -> (FormConfig, LoopAction) {
        let group = ActionGroup {
            id: "body".to_string(),
            actions: body,
        };
        let mut groups = HashMap::new();
        groups.insert(group.id.clone(), group);
        let form = FormConfig {
            id: "f".to_string(),
            title: "t".to_string(),
            fields: vec![],
            actions: vec![],
            action_groups: groups,
        };
        let loop_action = LoopAction {
            config,
            body_group_id: "body".to_string(),
        };
        (form, loop_action)
    }

    fn basic(id: &str, template: &str) -> FormAction {
        FormAction {
            id: id.to_string(),
            name: None,
            kind: ActionKind::Basic {
                action_type: "insert-text".to_string(),
                template: Some(template.to_string()),
            },
        }
    }

    fn control(id: &str, kind: ActionKind) -> FormAction {
        FormAction {
            id: id.to_string(),
            name: None,
            kind,
        }
    }

    fn count_config(start: i64, end: i64) -> LoopConfig {
        LoopConfig {
            count_start: start,
            count_end: end,
            ..LoopConfig::new(LoopType::Count)
        }
    }

    /// Dispatcher that fails scripted iterations, recording every attempt.
    struct FailingDispatcher {
        /// item values that fail on dispatch
        fail_on: Vec<Value>,
        /// fail this many times before succeeding (per call counter)
        fail_first: u32,
        calls: Mutex<u32>,
    }

    impl FailingDispatcher {
        fn failing_on(values: Vec<Value>) -> Self {
            Self {
                fail_on: values,
                fail_first: 0,
                calls: Mutex::new(0),
            }
        }

        fn failing_first(n: u32) -> Self {
            Self {
                fail_on: vec![],
                fail_first: n,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ActionDispatcher for FailingDispatcher {
        async fn dispatch(
            &self,
            _actions: &[FormAction],
            _form: &FormConfig,
            ctx: &mut ExecutionContext,
        ) -> Result<()> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if call <= self.fail_first {
                return Err(FormloopError::Dispatch(format!("scripted failure {}", call)));
            }
            if let Some(item) = ctx.scope.get_value("item")
                && self.fail_on.contains(item)
            {
                return Err(FormloopError::Dispatch(format!("bad item {}", item)));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_count_loop_runs_all_iterations() {
        let (form, action) = loop_form(count_config(0, 3), vec![basic("b1", "n={{item}}")]);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Completed);
        assert!(report.completed());
        assert_eq!(report.iterations_completed, 4);
        assert_eq!(ctx.outputs, vec!["n=0", "n=1", "n=2", "n=3"]);
        // Frames and contexts fully unwound.
        assert!(!ctx.scope.is_inside_loop());
        assert!(!ctx.is_inside_loop());
    }

    #[tokio::test]
    async fn test_list_loop_binds_aliases() {
        let mut config = LoopConfig {
            list_data_source: Some("x, y".to_string()),
            ..LoopConfig::new(LoopType::List)
        };
        config.item_variable_name = "note".to_string();
        let (form, action) = loop_form(config, vec![basic("b1", "{{note}}/{{index}}/{{total}}/{{iteration}}")]);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.iterations_completed, 2);
        assert_eq!(ctx.outputs, vec!["x/0/2/1", "y/1/2/2"]);
    }

    #[tokio::test]
    async fn test_break_terminates_as_broken() {
        let body = vec![
            basic("b1", "saw {{item}}"),
            control("b2", ActionKind::Break),
            basic("b3", "unreached"),
        ];
        let (form, action) = loop_form(count_config(0, 9), body);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Broken);
        assert!(report.completed());
        assert_eq!(ctx.outputs, vec!["saw 0"]);
        assert!(!ctx.scope.is_inside_loop());
    }

    #[tokio::test]
    async fn test_continue_skips_rest_of_iteration() {
        let body = vec![
            basic("b1", "before {{item}}"),
            control("b2", ActionKind::Continue),
            basic("b3", "after {{item}}"),
        ];
        let (form, action) = loop_form(count_config(0, 2), body);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Completed);
        assert_eq!(report.iterations_completed, 3);
        assert_eq!(ctx.outputs, vec!["before 0", "before 1", "before 2"]);
    }

    #[tokio::test]
    async fn test_stop_strategy_propagates() {
        let (form, action) = loop_form(count_config(0, 5), vec![]);
        let mut ctx = ExecutionContext::default();
        let dispatcher = FailingDispatcher::failing_on(vec![json!(2)]);

        let err = LoopExecutor::execute("a1", &action, &form, &mut ctx, &dispatcher)
            .await
            .unwrap_err();

        assert!(matches!(err, FormloopError::Dispatch(_)));
        assert!(!ctx.scope.is_inside_loop());
        assert!(!ctx.is_inside_loop());
    }

    #[tokio::test]
    async fn test_continue_strategy_records_and_advances() {
        let config = LoopConfig {
            error_handling_strategy: ErrorHandlingStrategy::Continue,
            ..count_config(0, 4)
        };
        let (form, action) = loop_form(config, vec![]);
        let mut ctx = ExecutionContext::default();
        let dispatcher = FailingDispatcher::failing_on(vec![json!(1), json!(3)]);

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &dispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Completed);
        assert_eq!(report.iterations_completed, 3);
        assert_eq!(report.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_retry_strategy_retries_then_succeeds() {
        let config = LoopConfig {
            error_handling_strategy: ErrorHandlingStrategy::Retry,
            retry_count: Some(2),
            retry_delay_ms: Some(1),
            ..count_config(0, 0)
        };
        let (form, action) = loop_form(config, vec![]);
        let mut ctx = ExecutionContext::default();
        let dispatcher = FailingDispatcher::failing_first(2);

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &dispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Completed);
        assert_eq!(report.iterations_completed, 1);
        assert_eq!(dispatcher.calls(), 3);
        assert_eq!(report.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_retry_strategy_exhausts_to_stop() {
        let config = LoopConfig {
            error_handling_strategy: ErrorHandlingStrategy::Retry,
            retry_count: Some(1),
            ..count_config(0, 0)
        };
        let (form, action) = loop_form(config, vec![]);
        let mut ctx = ExecutionContext::default();
        let dispatcher = FailingDispatcher::failing_first(10);

        let err = LoopExecutor::execute("a1", &action, &form, &mut ctx, &dispatcher)
            .await
            .unwrap_err();

        assert!(matches!(err, FormloopError::Dispatch(_)));
        assert_eq!(dispatcher.calls(), 2);
        assert!(!ctx.scope.is_inside_loop());
    }

    #[tokio::test]
    async fn test_max_iterations_guard_is_fatal_despite_strategy() {
        let config = LoopConfig {
            condition_expression: Some("true".to_string()),
            max_iterations: 5,
            error_handling_strategy: ErrorHandlingStrategy::Continue,
            ..LoopConfig::new(LoopType::Condition)
        };
        let (form, action) = loop_form(config, vec![]);
        let mut ctx = ExecutionContext::default();

        let err = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap_err();

        assert!(matches!(err, FormloopError::MaxIterationsExceeded { limit: 5 }));
        assert!(!ctx.scope.is_inside_loop());
    }

    #[tokio::test]
    async fn test_condition_loop_stops_when_false() {
        let config = LoopConfig {
            condition_expression: Some("{{flag}} === true".to_string()),
            ..LoopConfig::new(LoopType::Condition)
        };
        // The body flips the flag off after the second round.
        struct FlagDispatcher;
        #[async_trait]
        impl ActionDispatcher for FlagDispatcher {
            async fn dispatch(
                &self,
                _actions: &[FormAction],
                _form: &FormConfig,
                ctx: &mut ExecutionContext,
            ) -> Result<()> {
                let round = ctx.scope.get_value("iteration").and_then(Value::as_u64).unwrap_or(0);
                if round >= 2 {
                    ctx.state.set("flag", json!(false));
                }
                Ok(())
            }
        }

        let (form, action) = loop_form(config, vec![]);
        let mut ctx = ExecutionContext::default();
        ctx.state.set("flag", json!(true));

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &FlagDispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Completed);
        assert_eq!(report.iterations_completed, 2);
    }

    #[tokio::test]
    async fn test_malformed_condition_completes_without_iterating() {
        let config = LoopConfig {
            condition_expression: Some("not ### valid".to_string()),
            ..LoopConfig::new(LoopType::Condition)
        };
        let (form, action) = loop_form(config, vec![basic("b1", "never")]);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Completed);
        assert_eq!(report.iterations_completed, 0);
        assert!(ctx.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_pagination_drives_pages() {
        let config = LoopConfig {
            current_page_variable: Some("page".to_string()),
            has_next_page_condition: Some("{{page}} < 3".to_string()),
            ..LoopConfig::new(LoopType::Pagination)
        };
        let (form, action) = loop_form(config, vec![basic("b1", "page {{page}}")]);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Completed);
        assert_eq!(report.iterations_completed, 3);
        assert_eq!(ctx.outputs, vec!["page 1", "page 2", "page 3"]);
    }

    #[tokio::test]
    async fn test_pagination_honors_max_pages() {
        let config = LoopConfig {
            current_page_variable: Some("page".to_string()),
            has_next_page_condition: Some("true".to_string()),
            max_pages: Some(2),
            ..LoopConfig::new(LoopType::Pagination)
        };
        let (form, action) = loop_form(config, vec![basic("b1", "page {{page}}")]);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.iterations_completed, 2);
        assert_eq!(ctx.outputs, vec!["page 1", "page 2"]);
    }

    #[tokio::test]
    async fn test_nested_loops_shadow_and_restore() {
        let inner_config = count_config(10, 11);
        let inner_group = ActionGroup {
            id: "inner-body".to_string(),
            actions: vec![basic("i1", "inner {{item}}")],
        };
        let inner_loop = control(
            "a2",
            ActionKind::Loop(LoopAction {
                config: inner_config,
                body_group_id: "inner-body".to_string(),
            }),
        );
        let (mut form, action) =
            loop_form(count_config(0, 1), vec![inner_loop, basic("o1", "outer {{item}}")]);
        form.action_groups.insert(inner_group.id.clone(), inner_group);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.iterations_completed, 2);
        // The inner loop shadows item; the outer binding reappears after.
        assert_eq!(
            ctx.outputs,
            vec!["inner 10", "inner 11", "outer 0", "inner 10", "inner 11", "outer 1"]
        );
        assert!(!ctx.scope.is_inside_loop());
    }

    #[tokio::test]
    async fn test_break_in_inner_loop_only_exits_inner() {
        let inner_group = ActionGroup {
            id: "inner-body".to_string(),
            actions: vec![control("i1", ActionKind::Break)],
        };
        let inner_loop = control(
            "a2",
            ActionKind::Loop(LoopAction {
                config: count_config(0, 9),
                body_group_id: "inner-body".to_string(),
            }),
        );
        let (mut form, action) =
            loop_form(count_config(0, 1), vec![inner_loop, basic("o1", "outer {{item}}")]);
        form.action_groups.insert(inner_group.id.clone(), inner_group);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap();

        assert_eq!(report.phase, LoopPhase::Completed);
        assert_eq!(ctx.outputs, vec!["outer 0", "outer 1"]);
    }

    #[tokio::test]
    async fn test_iteration_timeout_is_policy_failure() {
        struct SlowDispatcher;
        #[async_trait]
        impl ActionDispatcher for SlowDispatcher {
            async fn dispatch(
                &self,
                _actions: &[FormAction],
                _form: &FormConfig,
                _ctx: &mut ExecutionContext,
            ) -> Result<()> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }
        }

        let config = LoopConfig {
            single_iteration_timeout_ms: Some(5),
            error_handling_strategy: ErrorHandlingStrategy::Continue,
            ..count_config(0, 1)
        };
        let (form, action) = loop_form(config, vec![]);
        let mut ctx = ExecutionContext::default();

        let report = LoopExecutor::execute("a1", &action, &form, &mut ctx, &SlowDispatcher)
            .await
            .unwrap();

        // Both iterations time out; Continue absorbs them.
        assert_eq!(report.phase, LoopPhase::Completed);
        assert_eq!(report.iterations_completed, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(!ctx.scope.is_inside_loop());
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_iterations() {
        struct CancellingDispatcher(CancelFlag);
        #[async_trait]
        impl ActionDispatcher for CancellingDispatcher {
            async fn dispatch(
                &self,
                _actions: &[FormAction],
                _form: &FormConfig,
                _ctx: &mut ExecutionContext,
            ) -> Result<()> {
                self.0.cancel();
                Ok(())
            }
        }

        let (form, action) = loop_form(count_config(0, 9), vec![]);
        let mut ctx = ExecutionContext::default();
        let dispatcher = CancellingDispatcher(ctx.cancel_flag());

        let err = LoopExecutor::execute("a1", &action, &form, &mut ctx, &dispatcher)
            .await
            .unwrap_err();

        assert!(matches!(err, FormloopError::Cancelled));
        assert!(!ctx.scope.is_inside_loop());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_up_front() {
        let config = LoopConfig {
            count_step: 0,
            ..LoopConfig::new(LoopType::Count)
        };
        let (form, action) = loop_form(config, vec![]);
        let mut ctx = ExecutionContext::default();

        let err = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap_err();

        assert!(matches!(err, FormloopError::InvalidLoopConfig(_)));
    }

    #[tokio::test]
    async fn test_unknown_body_group_rejected() {
        let (form, _) = loop_form(count_config(0, 1), vec![]);
        let action = LoopAction {
            config: count_config(0, 1),
            body_group_id: "missing".to_string(),
        };
        let mut ctx = ExecutionContext::default();

        let err = LoopExecutor::execute("a1", &action, &form, &mut ctx, &LocalActionDispatcher)
            .await
            .unwrap_err();

        assert!(matches!(err, FormloopError::Form(_)));
    }

    #[test]
    fn test_report_completed_phases() {
        let mut report = LoopRunReport::new();
        assert!(!report.completed());
        report.phase = LoopPhase::Completed;
        assert!(report.completed());
        report.phase = LoopPhase::Broken;
        assert!(report.completed());
        report.phase = LoopPhase::StoppedByError;
        assert!(!report.completed());
    }
}
