// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory persistence implementation.
//!
//! Backs embedded engines and tests. Each table is guarded by its own lock;
//! updates are revision-checked so concurrent units of work touching the same
//! execution see a concurrent-modification error instead of a lost update.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entity::{EventSubscriptionEntity, ExecutionEntity};
use crate::error::{EngineError, Result};
use crate::model::ProcessDefinition;

use super::{EventSubscriptionStore, ExecutionStore, ProcessDefinitionStore};

/// In-memory persistence provider.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<String, ExecutionEntity>>,
    subscriptions: RwLock<Vec<EventSubscriptionEntity>>,
    definitions: RwLock<HashMap<String, Arc<ProcessDefinition>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored executions.
    pub fn execution_count(&self) -> usize {
        read(&self.executions).len()
    }

    /// Number of stored subscriptions.
    pub fn subscription_count(&self) -> usize {
        read(&self.subscriptions).len()
    }
}

impl ExecutionStore for InMemoryPersistence {
    fn find_execution(&self, id: &str) -> Result<Option<ExecutionEntity>> {
        Ok(read(&self.executions).get(id).cloned())
    }

    fn find_child_executions(&self, parent_id: &str) -> Result<Vec<ExecutionEntity>> {
        Ok(read(&self.executions)
            .values()
            .filter(|e| e.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    fn find_executions_by_process_instance(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<ExecutionEntity>> {
        Ok(read(&self.executions)
            .values()
            .filter(|e| e.process_instance_id == process_instance_id)
            .cloned()
            .collect())
    }

    fn insert_execution(&self, execution: &ExecutionEntity) -> Result<()> {
        let mut executions = write(&self.executions);
        if executions.contains_key(&execution.id) {
            return Err(EngineError::IllegalArgument(format!(
                "execution '{}' already exists",
                execution.id
            )));
        }
        let mut stored = execution.clone();
        stored.revision = 1;
        executions.insert(stored.id.clone(), stored);
        Ok(())
    }

    fn update_execution(&self, execution: &ExecutionEntity) -> Result<()> {
        let mut executions = write(&self.executions);
        let stored = executions
            .get_mut(&execution.id)
            .ok_or_else(|| EngineError::not_found("execution", &execution.id))?;

        if stored.revision != execution.revision {
            return Err(EngineError::ConcurrentModification {
                kind: "execution",
                id: execution.id.clone(),
            });
        }

        *stored = execution.clone();
        stored.revision += 1;
        Ok(())
    }

    fn delete_execution(&self, id: &str) -> Result<()> {
        write(&self.executions)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found("execution", id))
    }
}

impl EventSubscriptionStore for InMemoryPersistence {
    fn find_subscription(&self, id: &str) -> Result<Option<EventSubscriptionEntity>> {
        Ok(read(&self.subscriptions).iter().find(|s| s.id == id).cloned())
    }

    fn find_subscriptions_by_name(
        &self,
        event_type: &str,
        event_name: &str,
        tenant_id: Option<&str>,
    ) -> Result<Vec<EventSubscriptionEntity>> {
        Ok(read(&self.subscriptions)
            .iter()
            .filter(|s| s.event_type == event_type && s.event_name.as_deref() == Some(event_name))
            .filter(|s| tenant_id.is_none() || s.tenant_id.as_deref() == tenant_id)
            .cloned()
            .collect())
    }

    fn find_subscriptions_by_execution(
        &self,
        execution_id: &str,
        event_type: Option<&str>,
    ) -> Result<Vec<EventSubscriptionEntity>> {
        Ok(read(&self.subscriptions)
            .iter()
            .filter(|s| s.execution_id.as_deref() == Some(execution_id))
            .filter(|s| event_type.is_none_or(|t| s.event_type == t))
            .cloned()
            .collect())
    }

    fn find_subscriptions_by_process_definition(
        &self,
        process_definition_id: &str,
    ) -> Result<Vec<EventSubscriptionEntity>> {
        Ok(read(&self.subscriptions)
            .iter()
            .filter(|s| {
                s.execution_id.is_none()
                    && s.process_definition_id.as_deref() == Some(process_definition_id)
            })
            .cloned()
            .collect())
    }

    fn insert_subscription(&self, subscription: &EventSubscriptionEntity) -> Result<()> {
        let mut subscriptions = write(&self.subscriptions);
        if subscriptions.iter().any(|s| s.id == subscription.id) {
            return Err(EngineError::IllegalArgument(format!(
                "event subscription '{}' already exists",
                subscription.id
            )));
        }
        subscriptions.push(subscription.clone());
        Ok(())
    }

    fn update_subscription(&self, subscription: &EventSubscriptionEntity) -> Result<()> {
        let mut subscriptions = write(&self.subscriptions);
        let stored = subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| EngineError::not_found("event subscription", &subscription.id))?;
        *stored = subscription.clone();
        Ok(())
    }

    fn delete_subscription(&self, id: &str) -> Result<()> {
        let mut subscriptions = write(&self.subscriptions);
        let position = subscriptions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| EngineError::not_found("event subscription", id))?;
        subscriptions.remove(position);
        Ok(())
    }
}

impl ProcessDefinitionStore for InMemoryPersistence {
    fn find_definition(&self, id: &str) -> Result<Option<Arc<ProcessDefinition>>> {
        Ok(read(&self.definitions).get(id).cloned())
    }

    fn find_latest_definition_by_key(
        &self,
        key: &str,
        tenant_id: Option<&str>,
    ) -> Result<Option<Arc<ProcessDefinition>>> {
        Ok(read(&self.definitions)
            .values()
            .filter(|d| d.key == key && d.tenant_id.as_deref() == tenant_id)
            .max_by_key(|d| d.version)
            .cloned())
    }

    fn save_definition(&self, definition: Arc<ProcessDefinition>) -> Result<()> {
        write(&self.definitions).insert(definition.id.clone(), definition);
        Ok(())
    }
}
