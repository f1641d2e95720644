// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde_json::Value;
use tracing::debug;

use crate::command::CommandContext;
use crate::entity::{COMPENSATE_EVENT, EventSubscriptionEntity};
use crate::error::{EngineError, Result};

use super::{EngineEvent, EventHandler};

/// Handles `compensate` subscriptions.
///
/// The subscription's `configuration` names the compensating execution and
/// its activity names the compensated element. Compensating a sub-process
/// descends into the compensation subscriptions registered inside it, newest
/// first; compensating anything else starts the element's compensation
/// handler on the compensating execution.
///
/// Nested scopes are processed through a worklist; each descent step is
/// logged with its depth.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompensationEventHandler;

impl EventHandler for CompensationEventHandler {
    fn event_type(&self) -> &str {
        COMPENSATE_EVENT
    }

    fn handle_event(
        &self,
        ctx: &mut CommandContext,
        subscription: &EventSubscriptionEntity,
        _payload: Option<&Value>,
    ) -> Result<()> {
        let mut worklist = vec![(subscription.clone(), 0usize)];
        while let Some((current, depth)) = worklist.pop() {
            compensate(ctx, &current, depth, &mut worklist)?;
        }
        Ok(())
    }
}

fn compensate(
    ctx: &mut CommandContext,
    subscription: &EventSubscriptionEntity,
    depth: usize,
    worklist: &mut Vec<(EventSubscriptionEntity, usize)>,
) -> Result<()> {
    let subscription_id = subscription.id.as_str();
    let configuration = subscription.configuration.as_deref().ok_or_else(|| {
        EngineError::dispatch(
            subscription_id,
            "compensating execution not set for compensate event subscription",
            None,
        )
    })?;

    let compensating = ctx
        .executions()?
        .find_by_id(configuration)?
        .ok_or_else(|| {
            EngineError::dispatch(
                subscription_id,
                format!("compensating execution '{}' not found", configuration),
                None,
            )
        })?;

    let definition = ctx
        .process_definition(&compensating.process_definition_id)
        .map_err(|err| {
            EngineError::dispatch(
                subscription_id,
                "cannot start process instance: process model not found",
                Some(err),
            )
        })?;

    let activity_id = subscription.activity_id.as_deref().ok_or_else(|| {
        EngineError::dispatch(subscription_id, "compensate subscription has no activity", None)
    })?;
    let element = definition
        .require_flow_element(activity_id)
        .map_err(|err| EngineError::dispatch(subscription_id, "cannot resolve compensation target", Some(err)))?;

    if element.is_compensable_scope() {
        let mut children = ctx
            .event_subscriptions()?
            .find_by_execution(&compensating.id, Some(COMPENSATE_EVENT))?;
        children.sort_by(|a, b| b.created.cmp(&a.created));

        debug!(
            subscription_id,
            activity_id,
            depth = depth + 1,
            children = children.len(),
            "Descending into compensable scope"
        );

        let mut prepared = Vec::with_capacity(children.len());
        for mut child in children {
            match child.configuration.clone() {
                Some(child_execution_id) => {
                    let execution = ctx
                        .executions()?
                        .get_mut(&child_execution_id)
                        .map_err(|err| {
                            EngineError::dispatch(
                                &child.id,
                                format!("compensating execution '{}' not found", child_execution_id),
                                Some(err),
                            )
                        })?;
                    execution.parent_id = Some(compensating.id.clone());
                    execution.is_event_scope = false;
                }
                None => {
                    let execution = compensating.new_child();
                    child.configuration = Some(execution.id.clone());
                    ctx.executions()?.insert(execution);
                }
            }
            ctx.event_subscriptions()?.delete(&child.id)?;
            prepared.push((child, depth + 1));
        }

        // Newest child is popped first.
        worklist.extend(prepared.into_iter().rev());
        return Ok(());
    }

    ctx.services()
        .event_dispatcher()
        .dispatch(EngineEvent::ActivityCompensate {
            activity_id: element.id.clone(),
            execution_id: compensating.id.clone(),
            process_instance_id: compensating.process_instance_id.clone(),
            process_definition_id: compensating.process_definition_id.clone(),
        });

    ctx.executions()?
        .get_mut(&compensating.id)?
        .set_activity(element.id.clone());
    debug!(
        subscription_id,
        execution_id = %compensating.id,
        activity_id = %element.id,
        depth,
        "Continuing execution in compensation handler"
    );
    ctx.agenda_mut()
        .plan_continue_process_in_compensation(compensating.id.clone());
    Ok(())
}
