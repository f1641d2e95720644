// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event subscription dispatch.
//!
//! An incoming event is matched to stored [`EventSubscriptionEntity`]s by
//! the built-in commands; each match is handed to [`event_received`], which
//! selects the [`EventHandler`] registered for the subscription's event type.
//! Handlers translate the event into agenda operations of the current
//! command context.

mod compensation;
pub mod dispatcher;
mod message;
pub mod names;
mod signal;

pub use compensation::CompensationEventHandler;
pub use dispatcher::{EngineEvent, EngineEventDispatcher, EngineEventListener};
pub use message::MessageEventHandler;
pub use names::{determine_message_name, determine_signal_name};
pub use signal::SignalEventHandler;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::command::{CommandConfig, CommandContext, CommandContextCloseListener, CommandExecutor};
use crate::commands::ProcessEventCmd;
use crate::entity::{COMPENSATE_EVENT, EventSubscriptionEntity};
use crate::error::{EngineError, Result};
use crate::executor::AsyncTaskInvoker;
use crate::model::FlowElementKind;

/// Strategy for one event type.
pub trait EventHandler: Send + Sync {
    /// Event type key this handler is registered under.
    fn event_type(&self) -> &str;

    /// Translate the event into work for the current context.
    fn handle_event(
        &self,
        ctx: &mut CommandContext,
        subscription: &EventSubscriptionEntity,
        payload: Option<&Value>,
    ) -> Result<()>;
}

/// Handlers keyed by event type.
#[derive(Clone, Default)]
pub struct EventHandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl fmt::Debug for EventHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("EventHandlerRegistry")
            .field("event_types", &types)
            .finish()
    }
}

impl EventHandlerRegistry {
    /// Registry with the signal, message and compensation handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(SignalEventHandler));
        registry.register(Arc::new(MessageEventHandler));
        registry.register(Arc::new(CompensationEventHandler));
        registry
    }

    /// Register a handler, replacing one with the same event type.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .insert(handler.event_type().to_string(), handler);
    }

    /// Handler for an event type.
    pub fn get(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(event_type).cloned()
    }
}

/// Where a matched subscription is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Processing {
    /// In the current command context.
    #[default]
    Sync,
    /// In a new command context on the async task executor, after the
    /// current context closed successfully.
    Async,
}

/// Dispatch an event to the handler of `subscription`.
pub fn event_received(
    ctx: &mut CommandContext,
    subscription: EventSubscriptionEntity,
    payload: Option<Value>,
    processing: Processing,
) -> Result<()> {
    match processing {
        Processing::Sync => process_event_sync(ctx, &subscription, payload.as_ref()),
        Processing::Async => {
            debug!(
                subscription_id = %subscription.id,
                event_type = %subscription.event_type,
                "Scheduling asynchronous event dispatch"
            );
            let listener = AsyncEventDispatch {
                subscription_id: subscription.id,
                payload,
                executor: ctx.executor().clone(),
                invoker: ctx.services().async_task_invoker().clone(),
            };
            ctx.add_close_listener(listener);
            Ok(())
        }
    }
}

/// Run the handler of `subscription` in the current context.
pub fn process_event_sync(
    ctx: &mut CommandContext,
    subscription: &EventSubscriptionEntity,
    payload: Option<&Value>,
) -> Result<()> {
    if subscription.event_type == COMPENSATE_EVENT {
        ctx.event_subscriptions()?.delete(&subscription.id)?;
    }

    let handler = ctx
        .services()
        .event_handlers()
        .get(&subscription.event_type)
        .ok_or_else(|| EngineError::EventHandlerNotFound {
            event_type: subscription.event_type.clone(),
        })?;

    debug!(
        subscription_id = %subscription.id,
        event_type = %subscription.event_type,
        event_name = ?subscription.event_name,
        "Dispatching event to handler"
    );
    handler.handle_event(ctx, subscription, payload)
}

/// Resume the execution a subscription is bound to.
///
/// Shared by the signal and message handlers: the payload (when it is an
/// object) becomes execution variables, an interrupting boundary event
/// announces the cancellation of its activity, and the execution is
/// triggered.
pub(crate) fn trigger_subscribed_execution(
    ctx: &mut CommandContext,
    subscription: &EventSubscriptionEntity,
    payload: Option<&Value>,
) -> Result<()> {
    let execution_id = subscription.execution_id.as_deref().ok_or_else(|| {
        EngineError::dispatch(&subscription.id, "subscription is not bound to an execution", None)
    })?;

    let execution = ctx
        .executions()?
        .find_by_id(execution_id)?
        .ok_or_else(|| EngineError::not_found("execution", execution_id))?;

    let Some(current_activity) = execution.activity_id.clone() else {
        return Err(EngineError::dispatch(
            &subscription.id,
            format!("execution '{}' has no current activity", execution_id),
            None,
        ));
    };

    if let Some(Value::Object(variables)) = payload {
        ctx.executions()?.get_mut(execution_id)?.set_variables(variables);
    }

    let definition = ctx
        .process_definition(&execution.process_definition_id)
        .map_err(|err| {
            EngineError::dispatch(&subscription.id, "could not load process definition", Some(err))
        })?;
    let activity_id = subscription
        .activity_id
        .as_deref()
        .unwrap_or(&current_activity);

    if let Some(element) = definition.flow_element(activity_id) {
        if let FlowElementKind::BoundaryEvent {
            attached_to,
            cancel_activity: true,
        } = &element.kind
        {
            ctx.services().event_dispatcher().dispatch(EngineEvent::ActivityCancelled {
                activity_id: attached_to.clone(),
                cause: element.id.clone(),
                execution_id: execution.id.clone(),
                process_instance_id: execution.process_instance_id.clone(),
                process_definition_id: execution.process_definition_id.clone(),
            });
        }
    }

    ctx.agenda_mut().plan_trigger_execution(execution_id);
    Ok(())
}

/// Submits the dispatch of one subscription to the async task invoker once
/// the registering context closed successfully.
struct AsyncEventDispatch {
    subscription_id: String,
    payload: Option<Value>,
    executor: CommandExecutor,
    invoker: AsyncTaskInvoker,
}

impl CommandContextCloseListener for AsyncEventDispatch {
    fn closed(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        let executor = self.executor.clone();
        let command = ProcessEventCmd::new(self.subscription_id.clone(), self.payload.take());
        self.invoker.execute(move || {
            let subscription_id = command.subscription_id().to_string();
            if let Err(error) = executor.execute(CommandConfig::transaction_requires_new(), command) {
                debug!(
                    subscription_id = %subscription_id,
                    error = %error,
                    "Asynchronous event dispatch failed"
                );
            }
        });
        Ok(())
    }
}
