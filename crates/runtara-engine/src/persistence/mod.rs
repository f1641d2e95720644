// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces consumed by the engine core.
//!
//! The store traits are the boundary to the host's persistence layer. They
//! are shared by every unit of work and must provide their own isolation.
//! Within one unit of work, entities are read and written through the
//! per-context entity managers in [`session`], which cache what was loaded
//! and write changes back when the command context flushes.

mod cache;
pub mod memory;
pub mod session;

pub use memory::InMemoryPersistence;
pub use session::{EventSubscriptionEntityManager, ExecutionEntityManager};

use std::sync::Arc;

use crate::entity::{EventSubscriptionEntity, ExecutionEntity};
use crate::error::Result;
use crate::model::ProcessDefinition;

/// Storage for executions.
pub trait ExecutionStore: Send + Sync {
    /// Load one execution.
    fn find_execution(&self, id: &str) -> Result<Option<ExecutionEntity>>;

    /// Direct children of an execution.
    fn find_child_executions(&self, parent_id: &str) -> Result<Vec<ExecutionEntity>>;

    /// All executions of a process instance, including the instance itself.
    fn find_executions_by_process_instance(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<ExecutionEntity>>;

    /// Insert a new execution.
    fn insert_execution(&self, execution: &ExecutionEntity) -> Result<()>;

    /// Update an execution. Fails with a concurrent-modification error when
    /// the stored revision differs from `execution.revision`.
    fn update_execution(&self, execution: &ExecutionEntity) -> Result<()>;

    /// Delete an execution.
    fn delete_execution(&self, id: &str) -> Result<()>;
}

/// Storage for event subscriptions.
pub trait EventSubscriptionStore: Send + Sync {
    /// Load one subscription.
    fn find_subscription(&self, id: &str) -> Result<Option<EventSubscriptionEntity>>;

    /// Subscriptions of a type with a given event name, optionally restricted to a tenant.
    fn find_subscriptions_by_name(
        &self,
        event_type: &str,
        event_name: &str,
        tenant_id: Option<&str>,
    ) -> Result<Vec<EventSubscriptionEntity>>;

    /// Subscriptions held by an execution, optionally of one type.
    fn find_subscriptions_by_execution(
        &self,
        execution_id: &str,
        event_type: Option<&str>,
    ) -> Result<Vec<EventSubscriptionEntity>>;

    /// Start-event subscriptions of a process definition.
    fn find_subscriptions_by_process_definition(
        &self,
        process_definition_id: &str,
    ) -> Result<Vec<EventSubscriptionEntity>>;

    /// Insert a subscription.
    fn insert_subscription(&self, subscription: &EventSubscriptionEntity) -> Result<()>;

    /// Replace a stored subscription.
    fn update_subscription(&self, subscription: &EventSubscriptionEntity) -> Result<()>;

    /// Delete a subscription.
    fn delete_subscription(&self, id: &str) -> Result<()>;
}

/// Storage for deployed process definitions.
pub trait ProcessDefinitionStore: Send + Sync {
    /// Load a definition by id.
    fn find_definition(&self, id: &str) -> Result<Option<Arc<ProcessDefinition>>>;

    /// Latest version of a key within a tenant.
    fn find_latest_definition_by_key(
        &self,
        key: &str,
        tenant_id: Option<&str>,
    ) -> Result<Option<Arc<ProcessDefinition>>>;

    /// Store a definition.
    fn save_definition(&self, definition: Arc<ProcessDefinition>) -> Result<()>;
}

/// The stores a running engine reads and writes.
#[derive(Clone)]
pub struct PersistenceStores {
    /// Execution storage.
    pub executions: Arc<dyn ExecutionStore>,
    /// Event subscription storage.
    pub event_subscriptions: Arc<dyn EventSubscriptionStore>,
    /// Definition storage.
    pub definitions: Arc<dyn ProcessDefinitionStore>,
}

impl std::fmt::Debug for PersistenceStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStores").finish_non_exhaustive()
    }
}

impl PersistenceStores {
    /// Use one in-memory backend for every store.
    pub fn in_memory(persistence: Arc<InMemoryPersistence>) -> Self {
        Self {
            executions: persistence.clone(),
            event_subscriptions: persistence.clone(),
            definitions: persistence,
        }
    }
}
