// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployed process model as seen by the execution core.
//!
//! Model parsing is not part of this crate; hosts build [`ProcessDefinition`]s
//! programmatically (or from their own parsers) and deploy them.

mod behavior;

pub use behavior::ActivityBehavior;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Kind of a flow element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowElementKind {
    /// Process or sub-process start event.
    StartEvent,
    /// Catching intermediate event (wait state).
    IntermediateCatchEvent,
    /// Event attached to an activity.
    BoundaryEvent {
        /// Activity the event is attached to.
        attached_to: String,
        /// Whether firing cancels the attached activity.
        cancel_activity: bool,
    },
    /// Any task-like activity.
    Task,
    /// Embedded sub-process.
    SubProcess,
    /// Event-triggered sub-process.
    EventSubProcess,
    /// End event.
    EndEvent,
    /// Gateway.
    Gateway,
}

/// Signal declared on the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Reference id used by event definitions.
    pub id: String,
    /// Name under which the signal is thrown and caught.
    pub name: String,
}

/// Message declared on the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Reference id used by event definitions.
    pub id: String,
    /// Human readable name (never used as the correlation key).
    pub name: String,
}

/// Signal event definition on a catching or start event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalEventDefinition {
    /// Reference to a model [`Signal`].
    pub signal_ref: Option<String>,
    /// Expression yielding the signal name.
    pub signal_expression: Option<String>,
}

/// Message event definition on a catching or start event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEventDefinition {
    /// Message reference, used verbatim as the correlation key.
    pub message_ref: Option<String>,
    /// Expression yielding the message name.
    pub message_expression: Option<String>,
}

/// Event definition attached to an event flow element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDefinition {
    /// Signal trigger.
    Signal(SignalEventDefinition),
    /// Message trigger.
    Message(MessageEventDefinition),
    /// Compensation trigger, optionally targeting one activity.
    Compensate {
        /// Activity to compensate, `None` for the whole scope.
        activity_ref: Option<String>,
    },
}

/// One node of a process model.
#[derive(Clone)]
pub struct FlowElement {
    /// Element id, unique within the definition.
    pub id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Element kind.
    pub kind: FlowElementKind,
    /// Containing sub-process, `None` for top-level elements.
    pub parent_id: Option<String>,
    /// Whether the element is a compensation handler.
    pub for_compensation: bool,
    /// Event trigger, for event elements.
    pub event_definition: Option<EventDefinition>,
    behavior: Option<Arc<dyn ActivityBehavior>>,
}

impl fmt::Debug for FlowElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowElement")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("parent_id", &self.parent_id)
            .field("for_compensation", &self.for_compensation)
            .field("event_definition", &self.event_definition)
            .field("behavior", &self.behavior.as_ref().map(|_| "..."))
            .finish()
    }
}

impl FlowElement {
    /// Create an element of the given kind.
    pub fn new(id: impl Into<String>, kind: FlowElementKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
            parent_id: None,
            for_compensation: false,
            event_definition: None,
            behavior: None,
        }
    }

    /// Start event.
    pub fn start_event(id: impl Into<String>) -> Self {
        Self::new(id, FlowElementKind::StartEvent)
    }

    /// Intermediate catching event.
    pub fn intermediate_catch_event(id: impl Into<String>) -> Self {
        Self::new(id, FlowElementKind::IntermediateCatchEvent)
    }

    /// Boundary event attached to `attached_to`.
    pub fn boundary_event(
        id: impl Into<String>,
        attached_to: impl Into<String>,
        cancel_activity: bool,
    ) -> Self {
        Self::new(
            id,
            FlowElementKind::BoundaryEvent {
                attached_to: attached_to.into(),
                cancel_activity,
            },
        )
    }

    /// Task.
    pub fn task(id: impl Into<String>) -> Self {
        Self::new(id, FlowElementKind::Task)
    }

    /// Embedded sub-process.
    pub fn sub_process(id: impl Into<String>) -> Self {
        Self::new(id, FlowElementKind::SubProcess)
    }

    /// End event.
    pub fn end_event(id: impl Into<String>) -> Self {
        Self::new(id, FlowElementKind::EndEvent)
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Place the element inside a sub-process.
    pub fn in_sub_process(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Mark the element as a compensation handler.
    pub fn for_compensation(mut self) -> Self {
        self.for_compensation = true;
        self
    }

    /// Attach an event definition.
    pub fn with_event_definition(mut self, definition: EventDefinition) -> Self {
        self.event_definition = Some(definition);
        self
    }

    /// Attach a signal event definition.
    pub fn with_signal(mut self, signal_ref: Option<&str>, signal_expression: Option<&str>) -> Self {
        self.event_definition = Some(EventDefinition::Signal(SignalEventDefinition {
            signal_ref: signal_ref.map(str::to_string),
            signal_expression: signal_expression.map(str::to_string),
        }));
        self
    }

    /// Attach a message event definition.
    pub fn with_message(mut self, message_ref: Option<&str>, message_expression: Option<&str>) -> Self {
        self.event_definition = Some(EventDefinition::Message(MessageEventDefinition {
            message_ref: message_ref.map(str::to_string),
            message_expression: message_expression.map(str::to_string),
        }));
        self
    }

    /// Attach the behavior invoked by agenda operations.
    pub fn with_behavior(mut self, behavior: Arc<dyn ActivityBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// The attached behavior.
    pub fn behavior(&self) -> Option<&Arc<dyn ActivityBehavior>> {
        self.behavior.as_ref()
    }

    /// Whether this is a sub-process that is not itself a compensation handler.
    pub fn is_compensable_scope(&self) -> bool {
        matches!(self.kind, FlowElementKind::SubProcess) && !self.for_compensation
    }
}

/// A deployed, immutable process definition.
#[derive(Debug, Clone)]
pub struct ProcessDefinition {
    /// `key:version`.
    pub id: String,
    /// Key shared by all versions.
    pub key: String,
    /// Version number, starting at 1.
    pub version: u32,
    /// Display name.
    pub name: Option<String>,
    /// Tenant.
    pub tenant_id: Option<String>,
    /// Suspended definitions cannot start new instances.
    pub suspended: bool,
    initial_flow_element: Option<String>,
    elements: HashMap<String, FlowElement>,
    element_order: Vec<String>,
    signals: HashMap<String, Signal>,
    messages: HashMap<String, Message>,
}

impl ProcessDefinition {
    /// Start building a definition.
    pub fn builder(key: impl Into<String>) -> ProcessDefinitionBuilder {
        ProcessDefinitionBuilder::new(key)
    }

    /// Find a flow element at any nesting level.
    pub fn flow_element(&self, id: &str) -> Option<&FlowElement> {
        self.elements.get(id)
    }

    /// Find a flow element or fail with [`EngineError::FlowElementNotFound`].
    pub fn require_flow_element(&self, id: &str) -> Result<&FlowElement> {
        self.flow_element(id)
            .ok_or_else(|| EngineError::FlowElementNotFound {
                process_definition_id: self.id.clone(),
                activity_id: id.to_string(),
            })
    }

    /// The element new instances start at.
    pub fn initial_flow_element(&self) -> Option<&FlowElement> {
        self.initial_flow_element
            .as_deref()
            .and_then(|id| self.elements.get(id))
    }

    /// Elements in declaration order.
    pub fn flow_elements(&self) -> impl Iterator<Item = &FlowElement> {
        self.element_order
            .iter()
            .filter_map(|id| self.elements.get(id))
    }

    /// Top-level start events.
    pub fn start_events(&self) -> impl Iterator<Item = &FlowElement> {
        self.flow_elements().filter(|e| {
            matches!(e.kind, FlowElementKind::StartEvent) && e.parent_id.is_none()
        })
    }

    /// Look up a declared signal.
    pub fn signal(&self, id: &str) -> Option<&Signal> {
        self.signals.get(id)
    }

    /// Look up a declared message.
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.get(id)
    }
}

/// Builder for [`ProcessDefinition`].
#[derive(Debug)]
pub struct ProcessDefinitionBuilder {
    key: String,
    version: u32,
    name: Option<String>,
    tenant_id: Option<String>,
    suspended: bool,
    initial_flow_element: Option<String>,
    elements: Vec<FlowElement>,
    signals: Vec<Signal>,
    messages: Vec<Message>,
}

impl ProcessDefinitionBuilder {
    fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 1,
            name: None,
            tenant_id: None,
            suspended: false,
            initial_flow_element: None,
            elements: Vec::new(),
            signals: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Set the version (default 1).
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the tenant.
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Deploy the definition in suspended state.
    pub fn suspended(mut self) -> Self {
        self.suspended = true;
        self
    }

    /// Override the initial element (defaults to the first top-level start event).
    pub fn initial(mut self, element_id: impl Into<String>) -> Self {
        self.initial_flow_element = Some(element_id.into());
        self
    }

    /// Add a flow element.
    pub fn element(mut self, element: FlowElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Declare a signal.
    pub fn signal(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.signals.push(Signal {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Declare a message.
    pub fn message(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.messages.push(Message {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ProcessDefinition> {
        let id = format!("{}:{}", self.key, self.version);
        let mut elements = HashMap::new();
        let mut element_order = Vec::with_capacity(self.elements.len());

        for element in self.elements {
            if elements.contains_key(&element.id) {
                return Err(EngineError::IllegalArgument(format!(
                    "duplicate flow element id '{}' in '{}'",
                    element.id, id
                )));
            }
            element_order.push(element.id.clone());
            elements.insert(element.id.clone(), element);
        }

        for element in elements.values() {
            let referenced = match (&element.parent_id, &element.kind) {
                (Some(parent), _) => Some(parent),
                (None, FlowElementKind::BoundaryEvent { attached_to, .. }) => Some(attached_to),
                _ => None,
            };
            if let Some(referenced) = referenced {
                if !elements.contains_key(referenced) {
                    return Err(EngineError::FlowElementNotFound {
                        process_definition_id: id.clone(),
                        activity_id: referenced.clone(),
                    });
                }
            }
        }

        let initial_flow_element = match self.initial_flow_element {
            Some(initial) if !elements.contains_key(&initial) => {
                return Err(EngineError::FlowElementNotFound {
                    process_definition_id: id,
                    activity_id: initial,
                });
            }
            Some(initial) => Some(initial),
            None => element_order
                .iter()
                .find(|eid| {
                    elements.get(*eid).is_some_and(|e| {
                        matches!(e.kind, FlowElementKind::StartEvent) && e.parent_id.is_none()
                    })
                })
                .cloned(),
        };

        Ok(ProcessDefinition {
            id,
            key: self.key,
            version: self.version,
            name: self.name,
            tenant_id: self.tenant_id,
            suspended: self.suspended,
            initial_flow_element,
            elements,
            element_order,
            signals: self.signals.into_iter().map(|s| (s.id.clone(), s)).collect(),
            messages: self.messages.into_iter().map(|m| (m.id.clone(), m)).collect(),
        })
    }
}
