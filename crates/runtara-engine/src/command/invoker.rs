// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::any::Any;

use tracing::debug;

use crate::agenda::{self, Operation};
use crate::error::{EngineError, Result};

use super::{CommandInvocation, CommandInvokerStage};

/// Terminal stage of the chain: runs the command body through the agenda.
///
/// A command joining a context whose agenda still holds work runs its body
/// immediately, leaving the outer drain in charge of whatever it plans.
/// Otherwise the body is planned as the first operation and the agenda is
/// drained. The context's owning command then plans one reconcile pass for
/// inactive executions if any execution was touched; nested commands never do.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandInvoker;

impl CommandInvokerStage for CommandInvoker {
    fn invoke(&self, invocation: CommandInvocation<'_>) -> Result<Box<dyn Any>> {
        let ctx = invocation.context.ok_or_else(|| {
            EngineError::Internal("command invoker reached without a command context".to_string())
        })?;

        if ctx.is_reused() && !ctx.agenda().is_empty() {
            debug!(
                command = invocation.name,
                queued = ctx.agenda().len(),
                "Running nested command body directly"
            );
            (invocation.body)(ctx)?;
        } else {
            ctx.agenda_mut()
                .plan_operation(Operation::Command(invocation.body));
            agenda::drain(ctx)?;

            if !ctx.is_reused() && !ctx.involved_executions().is_empty() {
                ctx.agenda_mut().plan_execute_inactive_behaviors();
                agenda::drain(ctx)?;
            }
        }

        ctx.pop_result().ok_or_else(|| {
            EngineError::Internal(format!(
                "command {} finished without a result",
                invocation.name
            ))
        })
    }
}
