// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExecutionEntity;

/// Event type key of signal subscriptions.
pub const SIGNAL_EVENT: &str = "signal";
/// Event type key of message subscriptions.
pub const MESSAGE_EVENT: &str = "message";
/// Event type key of compensation subscriptions.
pub const COMPENSATE_EVENT: &str = "compensate";

/// Persisted correlation between an event key and whatever waits for it.
///
/// A subscription is bound to exactly one of: a waiting execution
/// (`execution_id`), a definition start trigger (`process_definition_id`
/// without execution) or an external scope (`scope_id` + `scope_type`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSubscriptionEntity {
    /// Unique identifier.
    pub id: String,
    /// Handler key (`signal`, `message`, `compensate`, or a custom type).
    pub event_type: String,
    /// Resolved event name. Compensation subscriptions carry none.
    pub event_name: Option<String>,
    /// Waiting execution, if execution-bound.
    pub execution_id: Option<String>,
    /// Process instance of the waiting execution.
    pub process_instance_id: Option<String>,
    /// Process definition (start-event subscriptions have only this).
    pub process_definition_id: Option<String>,
    /// Flow element that declared the subscription.
    pub activity_id: Option<String>,
    /// Handler-specific configuration; the compensating execution for compensation.
    pub configuration: Option<String>,
    /// External scope id.
    pub scope_id: Option<String>,
    /// External scope type.
    pub scope_type: Option<String>,
    /// Tenant.
    pub tenant_id: Option<String>,
    /// Creation time, used to order compensation newest-first.
    pub created: DateTime<Utc>,
}

impl EventSubscriptionEntity {
    /// Create a subscription bound to a waiting execution.
    pub fn for_execution(
        event_type: &str,
        event_name: Option<String>,
        execution: &ExecutionEntity,
        activity_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            event_name,
            execution_id: Some(execution.id.clone()),
            process_instance_id: Some(execution.process_instance_id.clone()),
            process_definition_id: Some(execution.process_definition_id.clone()),
            activity_id: Some(activity_id.to_string()),
            configuration: None,
            scope_id: None,
            scope_type: None,
            tenant_id: execution.tenant_id.clone(),
            created: Utc::now(),
        }
    }

    /// Create a start-event subscription bound to a process definition.
    pub fn for_definition(
        event_type: &str,
        event_name: &str,
        process_definition_id: &str,
        activity_id: &str,
        tenant_id: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            event_name: Some(event_name.to_string()),
            execution_id: None,
            process_instance_id: None,
            process_definition_id: Some(process_definition_id.to_string()),
            activity_id: Some(activity_id.to_string()),
            configuration: None,
            scope_id: None,
            scope_type: None,
            tenant_id: tenant_id.map(str::to_string),
            created: Utc::now(),
        }
    }

    /// Whether the subscription waits on a running execution.
    pub fn is_execution_bound(&self) -> bool {
        self.execution_id.is_some()
    }

    /// Whether the subscription is a definition start trigger.
    pub fn is_start_subscription(&self) -> bool {
        self.execution_id.is_none() && self.process_definition_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_bound_subscription() {
        let instance = ExecutionEntity::new_process_instance("order:1", Some("acme"));
        let waiting = instance.new_child();

        let sub = EventSubscriptionEntity::for_execution(
            SIGNAL_EVENT,
            Some("paid".to_string()),
            &waiting,
            "waitForPayment",
        );

        assert!(sub.is_execution_bound());
        assert!(!sub.is_start_subscription());
        assert_eq!(sub.execution_id.as_deref(), Some(waiting.id.as_str()));
        assert_eq!(sub.process_instance_id.as_deref(), Some(instance.id.as_str()));
        assert_eq!(sub.tenant_id.as_deref(), Some("acme"));
    }

    #[test]
    fn test_definition_bound_subscription() {
        let sub = EventSubscriptionEntity::for_definition(
            SIGNAL_EVENT,
            "newOrder",
            "order:1",
            "start",
            None,
        );

        assert!(sub.is_start_subscription());
        assert!(!sub.is_execution_bound());
        assert_eq!(sub.event_name.as_deref(), Some("newOrder"));
    }
}
