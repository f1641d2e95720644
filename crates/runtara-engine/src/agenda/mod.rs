// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-unit-of-work operation queue.
//!
//! Operations run strictly in the order they were planned. An operation
//! that plans more work appends it to the tail, so everything queued before
//! it runs first:
//!
//! ```text
//! planned: [A, B]        A plans [A1, A2]
//! runs:     A, B, A1, A2
//! ```

mod operation;

pub use operation::Operation;

use std::collections::VecDeque;
use std::fmt;

use crate::command::CommandContext;
use crate::error::Result;

/// FIFO queue of [`Operation`]s owned by one command context.
#[derive(Default)]
pub struct Agenda {
    operations: VecDeque<Operation>,
}

impl fmt::Debug for Agenda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.operations.iter()).finish()
    }
}

impl Agenda {
    /// Append an operation to the tail.
    pub fn plan_operation(&mut self, operation: Operation) {
        self.operations.push_back(operation);
    }

    /// Continue an execution at its current flow element.
    pub fn plan_continue_process(&mut self, execution_id: impl Into<String>) {
        self.plan_operation(Operation::ContinueProcess {
            execution_id: execution_id.into(),
            in_compensation: false,
        });
    }

    /// Continue an execution inside a compensation handler.
    pub fn plan_continue_process_in_compensation(&mut self, execution_id: impl Into<String>) {
        self.plan_operation(Operation::ContinueProcess {
            execution_id: execution_id.into(),
            in_compensation: true,
        });
    }

    /// Resume a waiting execution.
    pub fn plan_trigger_execution(&mut self, execution_id: impl Into<String>) {
        self.plan_operation(Operation::TriggerExecution {
            execution_id: execution_id.into(),
        });
    }

    /// Give inactive executions a final chance to react.
    pub fn plan_execute_inactive_behaviors(&mut self) {
        self.plan_operation(Operation::ExecuteInactiveBehaviors);
    }

    /// Remove and return the head.
    pub fn next_operation(&mut self) -> Option<Operation> {
        self.operations.pop_front()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

/// Run queued operations until the agenda is empty.
///
/// The first failing operation aborts the drain; what is left on the
/// agenda is discarded together with the context.
pub fn drain(ctx: &mut CommandContext) -> Result<()> {
    while let Some(operation) = ctx.agenda_mut().next_operation() {
        operation.run(ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut agenda = Agenda::default();
        agenda.plan_continue_process("a");
        agenda.plan_trigger_execution("b");
        agenda.plan_execute_inactive_behaviors();
        assert_eq!(agenda.len(), 3);

        let names: Vec<_> = std::iter::from_fn(|| agenda.next_operation())
            .map(|op| (op.name().to_string(), op.execution_id().map(str::to_string)))
            .collect();

        assert_eq!(
            names,
            vec![
                ("continue-process".to_string(), Some("a".to_string())),
                ("trigger-execution".to_string(), Some("b".to_string())),
                ("execute-inactive-behaviors".to_string(), None),
            ]
        );
        assert!(agenda.is_empty());
    }

    #[test]
    fn test_compensation_flag() {
        let mut agenda = Agenda::default();
        agenda.plan_continue_process_in_compensation("c");
        assert!(matches!(
            agenda.next_operation(),
            Some(Operation::ContinueProcess {
                in_compensation: true,
                ..
            })
        ));
    }
}
