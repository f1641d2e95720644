// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in commands.
//!
//! | Command | Result | Purpose |
//! |---------|--------|---------|
//! | [`DeployProcessDefinitionCmd`] | definition id | Register a definition and its start subscriptions |
//! | [`StartProcessInstanceCmd`] | instance id | Start by key, id or message start event |
//! | [`TriggerCmd`] | `()` | Resume a waiting execution |
//! | [`SignalEventReceivedCmd`] | dispatch count | Broadcast a signal |
//! | [`MessageEventReceivedCmd`] | `()` | Deliver a message to one execution |
//! | [`ProcessEventCmd`] | `()` | Process one stored subscription |
//!
//! The free functions are helpers for activity behaviors that register or
//! remove subscriptions while an execution waits.

mod events;
mod process;

pub use events::{
    MessageEventReceivedCmd, ProcessEventCmd, SignalEventReceivedCmd,
    create_compensate_subscription, create_message_subscription, create_signal_subscription,
    delete_event_subscriptions_for_execution,
};
pub use process::{
    DeployProcessDefinitionCmd, ProcessDefinitionReference, StartProcessInstanceCmd, TriggerCmd,
    create_process_instance_at,
};
