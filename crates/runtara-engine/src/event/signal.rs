// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde_json::Value;
use tracing::debug;

use crate::command::CommandContext;
use crate::commands::create_process_instance_at;
use crate::entity::{EventSubscriptionEntity, SIGNAL_EVENT};
use crate::error::{EngineError, Result};

use super::{EventHandler, trigger_subscribed_execution};

/// Handles `signal` subscriptions.
///
/// Execution-bound subscriptions resume their execution. Definition-bound
/// (start event) subscriptions start a new process instance at the
/// subscribed start event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalEventHandler;

impl EventHandler for SignalEventHandler {
    fn event_type(&self) -> &str {
        SIGNAL_EVENT
    }

    fn handle_event(
        &self,
        ctx: &mut CommandContext,
        subscription: &EventSubscriptionEntity,
        payload: Option<&Value>,
    ) -> Result<()> {
        if subscription.execution_id.is_some() {
            return trigger_subscribed_execution(ctx, subscription, payload);
        }

        let Some(process_definition_id) = subscription.process_definition_id.as_deref() else {
            return Err(EngineError::IllegalArgument(format!(
                "Invalid signal handling: no execution nor process definition set for subscription '{}'",
                subscription.id
            )));
        };

        let definition = ctx.process_definition(process_definition_id)?;
        if definition.suspended {
            return Err(EngineError::ProcessDefinitionSuspended {
                process_definition_id: definition.id.clone(),
            });
        }

        let activity_id = subscription.activity_id.as_deref().ok_or_else(|| {
            EngineError::dispatch(&subscription.id, "start subscription has no activity", None)
        })?;
        let element = definition.require_flow_element(activity_id)?;

        let variables = match payload {
            Some(Value::Object(variables)) => Some(variables),
            _ => None,
        };
        let tenant_id = subscription
            .tenant_id
            .as_deref()
            .or(definition.tenant_id.as_deref());

        let (process_instance_id, execution_id) =
            create_process_instance_at(ctx, &definition, &element.id, variables, tenant_id)?;
        debug!(
            subscription_id = %subscription.id,
            process_definition_id,
            process_instance_id = %process_instance_id,
            "Signal started process instance"
        );

        ctx.agenda_mut().plan_continue_process(execution_id);
        Ok(())
    }
}
