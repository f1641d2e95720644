// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::command::CommandContext;
use crate::entity::ExecutionEntity;
use crate::error::{EngineError, Result};
use crate::model::ActivityBehavior;

/// A scheduled step of work.
pub enum Operation {
    /// The body of a command. Pushes the command's result on the result stack.
    Command(Box<dyn FnOnce(&mut CommandContext) -> Result<()>>),

    /// Run the behavior of the execution's current flow element.
    ContinueProcess {
        /// Execution to continue.
        execution_id: String,
        /// Whether the execution entered a compensation handler.
        in_compensation: bool,
    },

    /// Resume a waiting execution through its behavior's trigger.
    TriggerExecution {
        /// Execution to resume.
        execution_id: String,
    },

    /// Reconcile inactive executions touched by this unit of work.
    ExecuteInactiveBehaviors,

    /// Caller-supplied work, optionally bound to an execution.
    Custom {
        /// Bound execution; the operation is skipped once it has ended.
        execution_id: Option<String>,
        /// Name used in logs.
        name: String,
        /// The work.
        run: Box<dyn FnOnce(&mut CommandContext) -> Result<()>>,
    },
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.execution_id() {
            Some(execution_id) => write!(f, "{}({})", self.name(), execution_id),
            None => f.write_str(self.name()),
        }
    }
}

impl Operation {
    /// Build a custom operation.
    pub fn custom(
        name: impl Into<String>,
        execution_id: Option<String>,
        run: impl FnOnce(&mut CommandContext) -> Result<()> + 'static,
    ) -> Self {
        Self::Custom {
            execution_id,
            name: name.into(),
            run: Box::new(run),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Command(_) => "command",
            Self::ContinueProcess { .. } => "continue-process",
            Self::TriggerExecution { .. } => "trigger-execution",
            Self::ExecuteInactiveBehaviors => "execute-inactive-behaviors",
            Self::Custom { name, .. } => name,
        }
    }

    /// The execution the operation is bound to.
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            Self::ContinueProcess { execution_id, .. }
            | Self::TriggerExecution { execution_id } => Some(execution_id),
            Self::Custom { execution_id, .. } => execution_id.as_deref(),
            Self::Command(_) | Self::ExecuteInactiveBehaviors => None,
        }
    }

    /// Run the operation. An operation bound to an execution that has ended
    /// or no longer exists is skipped.
    pub fn run(self, ctx: &mut CommandContext) -> Result<()> {
        if let Some(execution_id) = self.execution_id() {
            let live = ctx
                .executions()?
                .find_by_id(execution_id)?
                .is_some_and(|execution| !execution.is_ended);
            if !live {
                debug!(
                    operation = self.name(),
                    execution_id, "Skipping operation, execution has ended"
                );
                return Ok(());
            }
            ctx.add_involved_execution(execution_id);
        }

        match self {
            Self::Command(body) => body(ctx),
            Self::ContinueProcess {
                execution_id,
                in_compensation,
            } => continue_process(ctx, &execution_id, in_compensation),
            Self::TriggerExecution { execution_id } => trigger_execution(ctx, &execution_id),
            Self::ExecuteInactiveBehaviors => execute_inactive_behaviors(ctx),
            Self::Custom { name, run, .. } => {
                debug!(operation = %name, "Running custom operation");
                run(ctx)
            }
        }
    }
}

fn load(ctx: &mut CommandContext, execution_id: &str) -> Result<ExecutionEntity> {
    ctx.executions()?
        .find_by_id(execution_id)?
        .ok_or_else(|| EngineError::not_found("execution", execution_id))
}

fn behavior_at(
    ctx: &CommandContext,
    execution: &ExecutionEntity,
    activity_id: &str,
) -> Result<Option<Arc<dyn ActivityBehavior>>> {
    let definition = ctx.process_definition(&execution.process_definition_id)?;
    let element = definition.require_flow_element(activity_id)?;
    Ok(element.behavior().cloned())
}

fn continue_process(ctx: &mut CommandContext, execution_id: &str, in_compensation: bool) -> Result<()> {
    let execution = load(ctx, execution_id)?;
    let Some(activity_id) = execution.activity_id.clone() else {
        debug!(execution_id, "Execution has no current activity, nothing to continue");
        return Ok(());
    };

    match behavior_at(ctx, &execution, &activity_id)? {
        Some(behavior) => {
            debug!(execution_id, activity_id = %activity_id, in_compensation, "Continuing process");
            behavior.execute(ctx, execution_id)
        }
        None => {
            debug!(
                execution_id,
                activity_id = %activity_id,
                "No behavior attached, execution waits"
            );
            Ok(())
        }
    }
}

fn trigger_execution(ctx: &mut CommandContext, execution_id: &str) -> Result<()> {
    let execution = load(ctx, execution_id)?;
    let activity_id = execution.activity_id.clone().ok_or_else(|| {
        EngineError::Engine(format!(
            "Execution '{}' is not positioned at an activity and cannot be triggered",
            execution_id
        ))
    })?;

    match behavior_at(ctx, &execution, &activity_id)? {
        Some(behavior) if behavior.is_triggerable() => {
            debug!(execution_id, activity_id = %activity_id, "Triggering execution");
            behavior.trigger(ctx, execution_id)
        }
        _ => Err(EngineError::NotTriggerable {
            execution_id: execution_id.to_string(),
            activity_id,
        }),
    }
}

fn execute_inactive_behaviors(ctx: &mut CommandContext) -> Result<()> {
    let involved = ctx.involved_executions().to_vec();
    for execution_id in involved {
        let Some(execution) = ctx.executions()?.find_by_id(&execution_id)? else {
            continue;
        };
        if execution.is_active || execution.is_ended {
            continue;
        }
        let Some(activity_id) = execution.activity_id.clone() else {
            continue;
        };
        if let Some(behavior) = behavior_at(ctx, &execution, &activity_id)? {
            if behavior.is_inactive_aware() {
                debug!(execution_id = %execution_id, activity_id = %activity_id, "Executing inactive behavior");
                behavior.execute_inactive(ctx, &execution_id)?;
            }
        }
    }
    Ok(())
}
