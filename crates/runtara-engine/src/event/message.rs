// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde_json::Value;

use crate::command::CommandContext;
use crate::entity::{EventSubscriptionEntity, MESSAGE_EVENT};
use crate::error::{EngineError, Result};

use super::{EngineEvent, EventHandler, trigger_subscribed_execution};

/// Handles `message` subscriptions: announces the message, then resumes the
/// waiting execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageEventHandler;

impl EventHandler for MessageEventHandler {
    fn event_type(&self) -> &str {
        MESSAGE_EVENT
    }

    fn handle_event(
        &self,
        ctx: &mut CommandContext,
        subscription: &EventSubscriptionEntity,
        payload: Option<&Value>,
    ) -> Result<()> {
        if subscription.execution_id.is_none() {
            return Err(EngineError::dispatch(
                &subscription.id,
                "message subscription is not bound to an execution",
                None,
            ));
        }

        ctx.services()
            .event_dispatcher()
            .dispatch(EngineEvent::MessageReceived {
                activity_id: subscription.activity_id.clone(),
                message_name: subscription.event_name.clone(),
                payload: payload.cloned(),
                execution_id: subscription.execution_id.clone(),
                process_instance_id: subscription.process_instance_id.clone(),
                process_definition_id: subscription.process_definition_id.clone(),
            });

        trigger_subscribed_execution(ctx, subscription, payload)
    }
}
