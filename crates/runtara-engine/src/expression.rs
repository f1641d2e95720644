// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Expression evaluation used to resolve event names.
//!
//! The engine only needs a narrow slice of an expression language: signal
//! and message names may be given as `${...}` templates evaluated against an
//! execution (or against [`NoExecutionVariableScope`] when there is none).
//! [`DefaultExpressionManager`] supports string literals and variable paths;
//! hosts with a richer language plug in their own [`ExpressionManager`].

use serde_json::Value;

use crate::error::{EngineError, Result};

/// Read access to variables for expression evaluation.
pub trait VariableScope {
    /// Look up a variable by name.
    fn variable(&self, name: &str) -> Option<Value>;
}

/// Variable scope used when no execution is available, e.g. when resolving
/// start-event names at deployment time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExecutionVariableScope;

static NO_EXECUTION_SCOPE: NoExecutionVariableScope = NoExecutionVariableScope;

impl NoExecutionVariableScope {
    /// The shared empty scope.
    pub fn shared() -> &'static NoExecutionVariableScope {
        &NO_EXECUTION_SCOPE
    }
}

impl VariableScope for NoExecutionVariableScope {
    fn variable(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Expression evaluation service.
pub trait ExpressionManager: Send + Sync {
    /// Evaluate `expression` against `scope`.
    fn evaluate(&self, expression: &str, scope: &dyn VariableScope) -> Result<Value>;

    /// Evaluate and render the result as a string.
    fn evaluate_to_string(&self, expression: &str, scope: &dyn VariableScope) -> Result<String> {
        Ok(render(&self.evaluate(expression, scope)?))
    }
}

/// Template evaluator supporting `${'literal'}`, `${"literal"}` and
/// `${variable.path}` segments embedded in plain text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExpressionManager;

impl ExpressionManager for DefaultExpressionManager {
    fn evaluate(&self, expression: &str, scope: &dyn VariableScope) -> Result<Value> {
        let mut rendered = String::new();
        let mut rest = expression;
        let mut segments = 0;
        let mut single: Option<Value> = None;

        while let Some(start) = rest.find("${") {
            let (text, tail) = rest.split_at(start);
            let end = tail.find('}').ok_or_else(|| EngineError::Expression {
                expression: expression.to_string(),
                message: "unterminated '${'".to_string(),
            })?;

            let value = evaluate_segment(expression, tail[2..end].trim(), scope)?;
            rendered.push_str(text);
            rendered.push_str(&render(&value));
            segments += 1;
            single = if text.is_empty() { Some(value) } else { None };
            rest = &tail[end + 1..];
        }

        // A lone `${...}` keeps the value's type.
        if segments == 1 && rest.is_empty() {
            if let Some(value) = single {
                return Ok(value);
            }
        }

        rendered.push_str(rest);
        Ok(Value::String(rendered))
    }
}

fn evaluate_segment(expression: &str, segment: &str, scope: &dyn VariableScope) -> Result<Value> {
    let quoted = |q: char| segment.len() >= 2 && segment.starts_with(q) && segment.ends_with(q);
    if quoted('\'') || quoted('"') {
        return Ok(Value::String(segment[1..segment.len() - 1].to_string()));
    }

    let mut path = segment.split('.');
    let root = path.next().unwrap_or_default();
    if root.is_empty() || !root.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(EngineError::Expression {
            expression: expression.to_string(),
            message: format!("unsupported expression segment '{}'", segment),
        });
    }

    let mut value = scope.variable(root).ok_or_else(|| EngineError::Expression {
        expression: expression.to_string(),
        message: format!("unknown property '{}'", root),
    })?;

    for key in path {
        value = value.get(key).cloned().ok_or_else(|| EngineError::Expression {
            expression: expression.to_string(),
            message: format!("unknown property '{}' in '{}'", key, segment),
        })?;
    }

    Ok(value)
}

/// Render a JSON value the way it appears inside a template.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
