// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hook through which flow elements contribute activity semantics.
//!
//! The core schedules and sequences work; what an activity actually does when
//! it is entered, triggered, or reconciled belongs to the behavior attached to
//! its flow element.

use crate::command::CommandContext;
use crate::error::Result;

/// Semantics of a flow element, invoked by agenda operations.
pub trait ActivityBehavior: Send + Sync {
    /// Called when an execution arrives at the element.
    fn execute(&self, ctx: &mut CommandContext, execution_id: &str) -> Result<()>;

    /// Whether [`trigger`](Self::trigger) is supported (wait states).
    fn is_triggerable(&self) -> bool {
        false
    }

    /// Called when a waiting execution is resumed by an event.
    fn trigger(&self, _ctx: &mut CommandContext, _execution_id: &str) -> Result<()> {
        Ok(())
    }

    /// Whether the element wants a final call for inactive executions at
    /// the end of a unit of work (e.g. joining gateways).
    fn is_inactive_aware(&self) -> bool {
        false
    }

    /// Called once per inactive, not-ended execution positioned at this
    /// element after the agenda drained.
    fn execute_inactive(&self, _ctx: &mut CommandContext, _execution_id: &str) -> Result<()> {
        Ok(())
    }
}
