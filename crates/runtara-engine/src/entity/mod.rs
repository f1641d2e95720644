// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mutable aggregates the engine core operates on.

mod event_subscription;
mod execution;

pub use event_subscription::{
    COMPENSATE_EVENT, EventSubscriptionEntity, MESSAGE_EVENT, SIGNAL_EVENT,
};
pub use execution::ExecutionEntity;

/// A mutable domain entity operations can be bound to.
///
/// The agenda skips any operation whose aggregate has ended by the time the
/// operation reaches the head of the queue.
pub trait Aggregate {
    /// Stable identity.
    fn id(&self) -> &str;

    /// Whether the aggregate reached its terminal state.
    fn is_ended(&self) -> bool;
}
