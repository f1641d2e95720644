// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Entity managers: per-context caches over the shared stores.
//!
//! Each command context opens at most one manager per entity kind. Reads go
//! through the cache so a unit of work sees its own uncommitted changes;
//! writes are buffered and pushed to the store when the context flushes.

use std::any::{Any, TypeId};
use std::sync::Arc;

use tracing::debug;

use crate::command::{Session, SessionFactory};
use crate::entity::{EventSubscriptionEntity, ExecutionEntity};
use crate::error::{EngineError, Result};

use super::cache::{CachedEntity, EntityCache};
use super::{EventSubscriptionStore, ExecutionStore};

impl CachedEntity for ExecutionEntity {
    fn cache_id(&self) -> &str {
        &self.id
    }
}

impl CachedEntity for EventSubscriptionEntity {
    fn cache_id(&self) -> &str {
        &self.id
    }
}

/// Unit-of-work view over an [`ExecutionStore`].
pub struct ExecutionEntityManager {
    store: Arc<dyn ExecutionStore>,
    cache: EntityCache<ExecutionEntity>,
}

impl ExecutionEntityManager {
    /// Create a manager with an empty cache.
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            cache: EntityCache::default(),
        }
    }

    /// Find an execution, loading it into the cache on first access.
    pub fn find_by_id(&mut self, id: &str) -> Result<Option<ExecutionEntity>> {
        if self.cache.contains(id) {
            return Ok(self.cache.get(id).cloned());
        }
        match self.store.find_execution(id)? {
            Some(execution) => {
                self.cache.loaded(execution.clone());
                Ok(Some(execution))
            }
            None => Ok(None),
        }
    }

    /// Mutable access to an execution; fails with not-found when it is gone.
    pub fn get_mut(&mut self, id: &str) -> Result<&mut ExecutionEntity> {
        self.find_by_id(id)?;
        self.cache
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("execution", id))
    }

    /// Direct children of an execution.
    pub fn find_child_executions(&mut self, parent_id: &str) -> Result<Vec<ExecutionEntity>> {
        let rows = self.store.find_child_executions(parent_id)?;
        Ok(self
            .cache
            .merge(rows, |e| e.parent_id.as_deref() == Some(parent_id)))
    }

    /// All executions of a process instance.
    pub fn find_by_process_instance(
        &mut self,
        process_instance_id: &str,
    ) -> Result<Vec<ExecutionEntity>> {
        let rows = self
            .store
            .find_executions_by_process_instance(process_instance_id)?;
        Ok(self
            .cache
            .merge(rows, |e| e.process_instance_id == process_instance_id))
    }

    /// Register a new execution.
    pub fn insert(&mut self, execution: ExecutionEntity) {
        debug!(execution_id = %execution.id, "Inserting execution");
        self.cache.inserted(execution);
    }

    /// Delete an execution.
    pub fn delete(&mut self, id: &str) -> Result<ExecutionEntity> {
        self.find_by_id(id)?;
        self.cache
            .delete(id)
            .ok_or_else(|| EngineError::not_found("execution", id))
    }
}

impl Session for ExecutionEntityManager {
    fn flush(&mut self) -> Result<()> {
        let pending = self.cache.pending_changes();
        let store = &self.store;
        self.cache.flush(
            |e| store.insert_execution(e),
            |e| store.update_execution(e),
            |id| store.delete_execution(id),
        )?;
        if pending > 0 {
            debug!(changes = pending, "Flushed executions");
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Opens [`ExecutionEntityManager`]s.
pub struct ExecutionEntityManagerFactory {
    store: Arc<dyn ExecutionStore>,
}

impl ExecutionEntityManagerFactory {
    /// Create a factory over `store`.
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }
}

impl SessionFactory for ExecutionEntityManagerFactory {
    fn session_type(&self) -> TypeId {
        TypeId::of::<ExecutionEntityManager>()
    }

    fn open_session(&self) -> Box<dyn Session> {
        Box::new(ExecutionEntityManager::new(self.store.clone()))
    }
}

/// Unit-of-work view over an [`EventSubscriptionStore`].
pub struct EventSubscriptionEntityManager {
    store: Arc<dyn EventSubscriptionStore>,
    cache: EntityCache<EventSubscriptionEntity>,
}

impl EventSubscriptionEntityManager {
    /// Create a manager with an empty cache.
    pub fn new(store: Arc<dyn EventSubscriptionStore>) -> Self {
        Self {
            store,
            cache: EntityCache::default(),
        }
    }

    /// Find a subscription by id.
    pub fn find_by_id(&mut self, id: &str) -> Result<Option<EventSubscriptionEntity>> {
        if self.cache.contains(id) {
            return Ok(self.cache.get(id).cloned());
        }
        match self.store.find_subscription(id)? {
            Some(subscription) => {
                self.cache.loaded(subscription.clone());
                Ok(Some(subscription))
            }
            None => Ok(None),
        }
    }

    /// Subscriptions of `event_type` named `event_name`, optionally within a tenant.
    pub fn find_by_name(
        &mut self,
        event_type: &str,
        event_name: &str,
        tenant_id: Option<&str>,
    ) -> Result<Vec<EventSubscriptionEntity>> {
        let rows = self
            .store
            .find_subscriptions_by_name(event_type, event_name, tenant_id)?;
        Ok(self.cache.merge(rows, |s| {
            s.event_type == event_type
                && s.event_name.as_deref() == Some(event_name)
                && (tenant_id.is_none() || s.tenant_id.as_deref() == tenant_id)
        }))
    }

    /// Subscriptions held by an execution, optionally of one type.
    pub fn find_by_execution(
        &mut self,
        execution_id: &str,
        event_type: Option<&str>,
    ) -> Result<Vec<EventSubscriptionEntity>> {
        let rows = self
            .store
            .find_subscriptions_by_execution(execution_id, event_type)?;
        Ok(self.cache.merge(rows, |s| {
            s.execution_id.as_deref() == Some(execution_id)
                && event_type.is_none_or(|t| s.event_type == t)
        }))
    }

    /// Start-event subscriptions of a definition.
    pub fn find_by_process_definition(
        &mut self,
        process_definition_id: &str,
    ) -> Result<Vec<EventSubscriptionEntity>> {
        let rows = self
            .store
            .find_subscriptions_by_process_definition(process_definition_id)?;
        Ok(self.cache.merge(rows, |s| {
            s.execution_id.is_none()
                && s.process_definition_id.as_deref() == Some(process_definition_id)
        }))
    }

    /// Mutable access to a subscription.
    pub fn get_mut(&mut self, id: &str) -> Result<&mut EventSubscriptionEntity> {
        self.find_by_id(id)?;
        self.cache
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("event subscription", id))
    }

    /// Register a new subscription.
    pub fn insert(&mut self, subscription: EventSubscriptionEntity) {
        debug!(
            subscription_id = %subscription.id,
            event_type = %subscription.event_type,
            event_name = ?subscription.event_name,
            "Inserting event subscription"
        );
        self.cache.inserted(subscription);
    }

    /// Delete a subscription.
    pub fn delete(&mut self, id: &str) -> Result<EventSubscriptionEntity> {
        self.find_by_id(id)?;
        self.cache
            .delete(id)
            .ok_or_else(|| EngineError::not_found("event subscription", id))
    }
}

impl Session for EventSubscriptionEntityManager {
    fn flush(&mut self) -> Result<()> {
        let pending = self.cache.pending_changes();
        let store = &self.store;
        self.cache.flush(
            |s| store.insert_subscription(s),
            |s| store.update_subscription(s),
            |id| store.delete_subscription(id),
        )?;
        if pending > 0 {
            debug!(changes = pending, "Flushed event subscriptions");
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Opens [`EventSubscriptionEntityManager`]s.
pub struct EventSubscriptionEntityManagerFactory {
    store: Arc<dyn EventSubscriptionStore>,
}

impl EventSubscriptionEntityManagerFactory {
    /// Create a factory over `store`.
    pub fn new(store: Arc<dyn EventSubscriptionStore>) -> Self {
        Self { store }
    }
}

impl SessionFactory for EventSubscriptionEntityManagerFactory {
    fn session_type(&self) -> TypeId {
        TypeId::of::<EventSubscriptionEntityManager>()
    }

    fn open_session(&self) -> Box<dyn Session> {
        Box::new(EventSubscriptionEntityManager::new(self.store.clone()))
    }
}
