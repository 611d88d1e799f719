//! `{{name}}` placeholder substitution.
//!
//! The full template engine lives in the host; the loop core only needs
//! the substitution hook that nested action configurations (text, file
//! paths, prompts) and loop conditions go through. Resolution order per
//! placeholder: loop-variable scope, then form state (dotted paths), then
//! the internal builtins. An unresolved placeholder is left verbatim so
//! authoring mistakes stay visible in the output.

use serde_json::Value;

use crate::executor::ExecutionContext;

/// Internal builtin names always available to templates.
const BUILTIN_DATE: &str = "date";
const BUILTIN_TIME: &str = "time";
const BUILTIN_RANDOM: &str = "random";

/// Render a template for human-facing output. String values substitute
/// bare; everything else substitutes as compact JSON.
pub fn render(template: &str, ctx: &ExecutionContext) -> String {
    substitute(template, ctx, |value| match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Render a condition expression before evaluation. String values
/// substitute as quoted JSON strings so the rendered expression stays
/// parseable.
pub fn render_condition(expression: &str, ctx: &ExecutionContext) -> String {
    substitute(expression, ctx, |value| value.to_string())
}

fn substitute(input: &str, ctx: &ExecutionContext, stringify: fn(Value) -> String) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = rest[open + 2..open + 2 + close].trim();
        match resolve(name, ctx) {
            Some(value) => out.push_str(&stringify(value)),
            None => out.push_str(&rest[open..open + close + 4]),
        }
        rest = &rest[open + close + 4..];
    }
    out.push_str(rest);
    out
}

fn resolve(name: &str, ctx: &ExecutionContext) -> Option<Value> {
    if name.is_empty() {
        return None;
    }
    if let Some(value) = ctx.scope.get_value(name) {
        return Some(value.clone());
    }
    if let Some(value) = ctx.state.get_path(name) {
        return Some(value.clone());
    }
    builtin(name, ctx)
}

fn builtin(name: &str, ctx: &ExecutionContext) -> Option<Value> {
    match name {
        BUILTIN_DATE => Some(Value::String(chrono::Local::now().format("%Y-%m-%d").to_string())),
        BUILTIN_TIME => Some(Value::String(chrono::Local::now().format("%H:%M:%S").to_string())),
        BUILTIN_RANDOM => Some(Value::from(rand::random_range(0..=9999))),
        // selection/clipboard are captured by the host at submit time.
        other => ctx.host_values.get(other).cloned(),
    }
}
