// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event name resolution for signal and message event definitions.
//!
//! | Definition            | Signal name                          | Message name           |
//! |-----------------------|--------------------------------------|------------------------|
//! | ref set               | model signal's name, else the ref    | the ref, verbatim      |
//! | expression only       | evaluated expression                 | evaluated expression   |
//! | neither               | none                                 | none                   |
//!
//! The message column never consults the model: a declared message's name
//! is not a correlation key.

use crate::error::Result;
use crate::expression::{ExpressionManager, NoExecutionVariableScope, VariableScope};
use crate::model::{MessageEventDefinition, ProcessDefinition, SignalEventDefinition};

/// Resolve the name a signal event definition listens to.
///
/// `scope` is the execution the name is resolved for, if any.
pub fn determine_signal_name(
    definition: &SignalEventDefinition,
    process: &ProcessDefinition,
    expressions: &dyn ExpressionManager,
    scope: Option<&dyn VariableScope>,
) -> Result<Option<String>> {
    let raw = match (&definition.signal_ref, &definition.signal_expression) {
        (Some(signal_ref), _) => match process.signal(signal_ref) {
            Some(signal) => signal.name.clone(),
            None => signal_ref.clone(),
        },
        (None, Some(expression)) => expression.clone(),
        (None, None) => return Ok(None),
    };

    let scope = scope.unwrap_or(NoExecutionVariableScope::shared());
    expressions.evaluate_to_string(&raw, scope).map(Some)
}

/// Resolve the name a message event definition listens to.
pub fn determine_message_name(
    definition: &MessageEventDefinition,
    expressions: &dyn ExpressionManager,
    scope: Option<&dyn VariableScope>,
) -> Result<Option<String>> {
    if let Some(message_ref) = &definition.message_ref {
        return Ok(Some(message_ref.clone()));
    }
    match &definition.message_expression {
        Some(expression) => {
            let scope = scope.unwrap_or(NoExecutionVariableScope::shared());
            expressions.evaluate_to_string(expression, scope).map(Some)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ExecutionEntity;
    use crate::expression::DefaultExpressionManager;
    use crate::model::FlowElement;
    use serde_json::json;

    fn process() -> ProcessDefinition {
        ProcessDefinition::builder("names")
            .signal("X", "sigX")
            .message("M", "declaredMessageName")
            .element(FlowElement::start_event("start"))
            .build()
            .unwrap()
    }

    fn signal(signal_ref: Option<&str>, expression: Option<&str>) -> SignalEventDefinition {
        SignalEventDefinition {
            signal_ref: signal_ref.map(str::to_string),
            signal_expression: expression.map(str::to_string),
        }
    }

    fn message(message_ref: Option<&str>, expression: Option<&str>) -> MessageEventDefinition {
        MessageEventDefinition {
            message_ref: message_ref.map(str::to_string),
            message_expression: expression.map(str::to_string),
        }
    }

    #[test]
    fn test_signal_ref_resolves_to_model_name_over_expression() {
        let name = determine_signal_name(
            &signal(Some("X"), Some("${'Y'}")),
            &process(),
            &DefaultExpressionManager,
            None,
        )
        .unwrap();
        assert_eq!(name.as_deref(), Some("sigX"));
    }

    #[test]
    fn test_undeclared_signal_ref_is_used_as_name() {
        let name = determine_signal_name(
            &signal(Some("plainSignal"), None),
            &process(),
            &DefaultExpressionManager,
            None,
        )
        .unwrap();
        assert_eq!(name.as_deref(), Some("plainSignal"));
    }

    #[test]
    fn test_signal_expression_uses_execution_scope() {
        let mut execution = ExecutionEntity::new_process_instance("names:1", None);
        execution.set_variable("region", json!("emea"));

        let name = determine_signal_name(
            &signal(None, Some("alert-${region}")),
            &process(),
            &DefaultExpressionManager,
            Some(&execution),
        )
        .unwrap();
        assert_eq!(name.as_deref(), Some("alert-emea"));
    }

    #[test]
    fn test_signal_without_ref_or_expression_has_no_name() {
        let name =
            determine_signal_name(&signal(None, None), &process(), &DefaultExpressionManager, None)
                .unwrap();
        assert!(name.is_none());
    }

    #[test]
    fn test_message_ref_is_verbatim_even_when_declared() {
        let name = determine_message_name(
            &message(Some("M"), Some("${'other'}")),
            &DefaultExpressionManager,
            None,
        )
        .unwrap();
        assert_eq!(name.as_deref(), Some("M"));
    }

    #[test]
    fn test_message_expression_without_ref() {
        let name =
            determine_message_name(&message(None, Some("${'invoice'}")), &DefaultExpressionManager, None)
                .unwrap();
        assert_eq!(name.as_deref(), Some("invoice"));
    }

    #[test]
    fn test_message_without_ref_or_expression_has_no_name() {
        let name =
            determine_message_name(&message(None, None), &DefaultExpressionManager, None).unwrap();
        assert!(name.is_none());
    }

    #[test]
    fn test_signal_expression_failure_propagates() {
        let err = determine_signal_name(
            &signal(None, Some("${unknownVariable}")),
            &process(),
            &DefaultExpressionManager,
            None,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "EXPRESSION_ERROR");
    }
}
