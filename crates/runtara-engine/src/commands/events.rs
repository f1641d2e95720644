// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event commands and subscription helpers for activity behaviors.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::entity::{
    COMPENSATE_EVENT, EventSubscriptionEntity, ExecutionEntity, MESSAGE_EVENT, SIGNAL_EVENT,
};
use crate::error::{EngineError, Result};
use crate::event::{
    Processing, determine_message_name, determine_signal_name, event_received, process_event_sync,
};
use crate::expression::VariableScope;
use crate::model::{EventDefinition, ProcessDefinition};

/// Deliver a signal to every matching subscription.
///
/// Returns the number of subscriptions the signal was dispatched to.
#[derive(Debug, Clone)]
pub struct SignalEventReceivedCmd {
    signal_name: String,
    payload: Option<Value>,
    execution_id: Option<String>,
    tenant_id: Option<String>,
    processing: Processing,
}

impl SignalEventReceivedCmd {
    /// Broadcast `signal_name`.
    pub fn new(signal_name: impl Into<String>) -> Self {
        Self {
            signal_name: signal_name.into(),
            payload: None,
            execution_id: None,
            tenant_id: None,
            processing: Processing::Sync,
        }
    }

    /// Payload delivered with the signal.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Only deliver to subscriptions of one execution.
    pub fn execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Only deliver within a tenant.
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Dispatch each subscription in its own context after this one closed.
    pub fn asynchronous(mut self) -> Self {
        self.processing = Processing::Async;
        self
    }
}

impl Command<usize> for SignalEventReceivedCmd {
    fn execute(&self, ctx: &mut CommandContext) -> Result<usize> {
        let subscriptions = match &self.execution_id {
            Some(execution_id) => {
                if ctx.executions()?.find_by_id(execution_id)?.is_none() {
                    return Err(EngineError::not_found("execution", execution_id.clone()));
                }
                ctx.event_subscriptions()?
                    .find_by_execution(execution_id, Some(SIGNAL_EVENT))?
                    .into_iter()
                    .filter(|s| s.event_name.as_deref() == Some(self.signal_name.as_str()))
                    .collect::<Vec<_>>()
            }
            None => ctx.event_subscriptions()?.find_by_name(
                SIGNAL_EVENT,
                &self.signal_name,
                self.tenant_id.as_deref(),
            )?,
        };

        debug!(
            signal_name = %self.signal_name,
            subscriptions = subscriptions.len(),
            processing = ?self.processing,
            "Signal received"
        );

        let count = subscriptions.len();
        for subscription in subscriptions {
            event_received(ctx, subscription, self.payload.clone(), self.processing)?;
        }
        Ok(count)
    }
}

/// Deliver a message to the execution waiting for it.
#[derive(Debug, Clone)]
pub struct MessageEventReceivedCmd {
    message_name: String,
    execution_id: String,
    payload: Option<Value>,
    processing: Processing,
}

impl MessageEventReceivedCmd {
    /// Deliver `message_name` to `execution_id`.
    pub fn new(message_name: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            message_name: message_name.into(),
            execution_id: execution_id.into(),
            payload: None,
            processing: Processing::Sync,
        }
    }

    /// Payload delivered with the message.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Dispatch after this context closed, in a new context.
    pub fn asynchronous(mut self) -> Self {
        self.processing = Processing::Async;
        self
    }
}

impl Command<()> for MessageEventReceivedCmd {
    fn execute(&self, ctx: &mut CommandContext) -> Result<()> {
        if ctx.executions()?.find_by_id(&self.execution_id)?.is_none() {
            return Err(EngineError::not_found("execution", self.execution_id.clone()));
        }

        let subscription = ctx
            .event_subscriptions()?
            .find_by_execution(&self.execution_id, Some(MESSAGE_EVENT))?
            .into_iter()
            .find(|s| s.event_name.as_deref() == Some(self.message_name.as_str()))
            .ok_or_else(|| {
                EngineError::IllegalArgument(format!(
                    "Execution with id '{}' does not have a subscription to a message event with name '{}'",
                    self.execution_id, self.message_name
                ))
            })?;

        event_received(ctx, subscription, self.payload.clone(), self.processing)
    }
}

/// Process one stored subscription in the current context.
///
/// This is what asynchronous dispatch runs on the worker pool.
#[derive(Debug, Clone)]
pub struct ProcessEventCmd {
    subscription_id: String,
    payload: Option<Value>,
}

impl ProcessEventCmd {
    /// Process `subscription_id` with `payload`.
    pub fn new(subscription_id: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            payload,
        }
    }

    /// The subscription to process.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }
}

impl Command<()> for ProcessEventCmd {
    fn execute(&self, ctx: &mut CommandContext) -> Result<()> {
        let subscription = ctx
            .event_subscriptions()?
            .find_by_id(&self.subscription_id)?
            .ok_or_else(|| EngineError::not_found("event subscription", self.subscription_id.clone()))?;
        process_event_sync(ctx, &subscription, self.payload.as_ref())
    }
}

type EventSource = (ExecutionEntity, Arc<ProcessDefinition>, Option<EventDefinition>);

fn event_definition(ctx: &mut CommandContext, execution_id: &str, element_id: &str) -> Result<EventSource> {
    let execution = ctx
        .executions()?
        .find_by_id(execution_id)?
        .ok_or_else(|| EngineError::not_found("execution", execution_id))?;
    let definition = ctx.process_definition(&execution.process_definition_id)?;
    let event_definition = definition
        .require_flow_element(element_id)?
        .event_definition
        .clone();
    Ok((execution, definition, event_definition))
}

/// Subscribe `execution_id` to the signal declared on `element_id`.
///
/// The signal name is resolved against the execution's variables.
pub fn create_signal_subscription(
    ctx: &mut CommandContext,
    execution_id: &str,
    element_id: &str,
) -> Result<EventSubscriptionEntity> {
    let (execution, definition, event_definition) = event_definition(ctx, execution_id, element_id)?;
    let Some(EventDefinition::Signal(signal)) = event_definition else {
        return Err(EngineError::IllegalArgument(format!(
            "flow element '{}' has no signal event definition",
            element_id
        )));
    };

    let expressions = ctx.services().expression_manager().clone();
    let scope: &dyn VariableScope = &execution;
    let name = determine_signal_name(&signal, &definition, expressions.as_ref(), Some(scope))?
        .ok_or_else(|| {
            EngineError::IllegalArgument(format!(
                "signal event definition of '{}' has neither a signal ref nor an expression",
                element_id
            ))
        })?;

    let subscription =
        EventSubscriptionEntity::for_execution(SIGNAL_EVENT, Some(name), &execution, element_id);
    ctx.event_subscriptions()?.insert(subscription.clone());
    Ok(subscription)
}

/// Subscribe `execution_id` to the message declared on `element_id`.
pub fn create_message_subscription(
    ctx: &mut CommandContext,
    execution_id: &str,
    element_id: &str,
) -> Result<EventSubscriptionEntity> {
    let (execution, _, event_definition) = event_definition(ctx, execution_id, element_id)?;
    let Some(EventDefinition::Message(message)) = event_definition else {
        return Err(EngineError::IllegalArgument(format!(
            "flow element '{}' has no message event definition",
            element_id
        )));
    };

    let expressions = ctx.services().expression_manager().clone();
    let scope: &dyn VariableScope = &execution;
    let name = determine_message_name(&message, expressions.as_ref(), Some(scope))?
        .ok_or_else(|| {
            EngineError::IllegalArgument(format!(
                "message event definition of '{}' has neither a message ref nor an expression",
                element_id
            ))
        })?;

    let subscription =
        EventSubscriptionEntity::for_execution(MESSAGE_EVENT, Some(name), &execution, element_id);
    ctx.event_subscriptions()?.insert(subscription.clone());
    Ok(subscription)
}

/// Register a compensation subscription on `execution_id` for `activity_id`.
///
/// `compensating_execution_id` is the execution the compensation handler
/// runs on. It may only be `None` for subscriptions nested inside a
/// compensable scope; a child execution is created when the scope descends.
pub fn create_compensate_subscription(
    ctx: &mut CommandContext,
    execution_id: &str,
    activity_id: &str,
    compensating_execution_id: Option<&str>,
) -> Result<EventSubscriptionEntity> {
    let execution = ctx
        .executions()?
        .find_by_id(execution_id)?
        .ok_or_else(|| EngineError::not_found("execution", execution_id))?;

    let mut subscription =
        EventSubscriptionEntity::for_execution(COMPENSATE_EVENT, None, &execution, activity_id);
    subscription.configuration = compensating_execution_id.map(str::to_string);
    ctx.event_subscriptions()?.insert(subscription.clone());
    Ok(subscription)
}

/// Delete the subscriptions held by an execution, optionally of one type.
/// Returns how many were deleted.
pub fn delete_event_subscriptions_for_execution(
    ctx: &mut CommandContext,
    execution_id: &str,
    event_type: Option<&str>,
) -> Result<usize> {
    let subscriptions = ctx
        .event_subscriptions()?
        .find_by_execution(execution_id, event_type)?;
    for subscription in &subscriptions {
        ctx.event_subscriptions()?.delete(&subscription.id)?;
    }
    Ok(subscriptions.len())
}
