// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Aggregate;
use crate::expression::VariableScope;

/// A running path of a process instance.
///
/// The root execution of an instance is the process instance itself
/// (`id == process_instance_id`); children track individual activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEntity {
    /// Unique identifier.
    pub id: String,
    /// Root execution of the instance this execution belongs to.
    pub process_instance_id: String,
    /// Parent execution, `None` for the process instance.
    pub parent_id: Option<String>,
    /// Definition the instance was started from.
    pub process_definition_id: String,
    /// Flow element the execution is currently positioned at.
    pub activity_id: Option<String>,
    /// Whether the execution is currently executing (as opposed to waiting for siblings).
    pub is_active: bool,
    /// Terminal flag. Operations bound to an ended execution are skipped.
    pub is_ended: bool,
    /// Whether the execution owns a variable scope.
    pub is_scope: bool,
    /// Completed scope kept around for compensation.
    pub is_event_scope: bool,
    /// Tenant of the instance.
    pub tenant_id: Option<String>,
    /// Local variables.
    pub variables: Map<String, Value>,
    /// Optimistic locking revision, bumped on every update.
    pub revision: u32,
}

impl ExecutionEntity {
    /// Create the root execution of a new process instance.
    pub fn new_process_instance(process_definition_id: &str, tenant_id: Option<&str>) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            process_instance_id: id.clone(),
            id,
            parent_id: None,
            process_definition_id: process_definition_id.to_string(),
            activity_id: None,
            is_active: true,
            is_ended: false,
            is_scope: true,
            is_event_scope: false,
            tenant_id: tenant_id.map(str::to_string),
            variables: Map::new(),
            revision: 0,
        }
    }

    /// Create a child of this execution in the same process instance.
    pub fn new_child(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            process_instance_id: self.process_instance_id.clone(),
            parent_id: Some(self.id.clone()),
            process_definition_id: self.process_definition_id.clone(),
            activity_id: None,
            is_active: true,
            is_ended: false,
            is_scope: false,
            is_event_scope: false,
            tenant_id: self.tenant_id.clone(),
            variables: Map::new(),
            revision: 0,
        }
    }

    /// Whether this is the root execution of its instance.
    pub fn is_process_instance(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Read a local variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Set a local variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Merge a map of variables into the local scope.
    pub fn set_variables(&mut self, variables: &Map<String, Value>) {
        for (name, value) in variables {
            self.variables.insert(name.clone(), value.clone());
        }
    }

    /// Move the execution to a flow element.
    pub fn set_activity(&mut self, activity_id: impl Into<String>) {
        self.activity_id = Some(activity_id.into());
    }

    /// Mark the execution as ended and inactive.
    pub fn end(&mut self) {
        self.is_active = false;
        self.is_ended = true;
    }
}

impl Aggregate for ExecutionEntity {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_ended(&self) -> bool {
        self.is_ended
    }
}

impl VariableScope for ExecutionEntity {
    fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }
}
