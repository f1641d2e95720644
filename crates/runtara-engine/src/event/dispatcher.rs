// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine-visible notifications raised during event dispatch.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Notification delivered to [`EngineEventListener`]s.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    /// A message was correlated to a waiting execution.
    MessageReceived {
        /// Element that waited for the message.
        activity_id: Option<String>,
        /// Correlated message name.
        message_name: Option<String>,
        /// Payload delivered with the message.
        payload: Option<Value>,
        /// Waiting execution.
        execution_id: Option<String>,
        /// Process instance of the execution.
        process_instance_id: Option<String>,
        /// Definition of the instance.
        process_definition_id: Option<String>,
    },
    /// A compensation handler is about to run.
    ActivityCompensate {
        /// Compensation handler element.
        activity_id: String,
        /// Execution running the handler.
        execution_id: String,
        /// Process instance.
        process_instance_id: String,
        /// Definition.
        process_definition_id: String,
    },
    /// An activity is cancelled by an interrupting boundary event.
    ActivityCancelled {
        /// The cancelled activity.
        activity_id: String,
        /// The boundary event that fired.
        cause: String,
        /// Execution positioned at the boundary event.
        execution_id: String,
        /// Process instance.
        process_instance_id: String,
        /// Definition.
        process_definition_id: String,
    },
}

impl EngineEvent {
    /// Short event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageReceived { .. } => "MESSAGE_RECEIVED",
            Self::ActivityCompensate { .. } => "ACTIVITY_COMPENSATE",
            Self::ActivityCancelled { .. } => "ACTIVITY_CANCELLED",
        }
    }
}

/// Receives [`EngineEvent`]s.
pub trait EngineEventListener: Send + Sync {
    /// Called synchronously on the thread that raised the event.
    fn on_event(&self, event: &EngineEvent);
}

impl<F> EngineEventListener for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent) {
        self(event)
    }
}

/// Fans events out to listeners while enabled.
pub struct EngineEventDispatcher {
    enabled: AtomicBool,
    listeners: RwLock<Vec<Arc<dyn EngineEventListener>>>,
}

impl fmt::Debug for EngineEventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEventDispatcher")
            .field("enabled", &self.is_enabled())
            .field(
                "listeners",
                &self.listeners.read().map(|l| l.len()).unwrap_or_default(),
            )
            .finish()
    }
}

impl EngineEventDispatcher {
    /// Create a dispatcher without listeners.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Whether events are delivered.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Switch delivery on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn EngineEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Deliver an event to every listener. Does nothing while disabled.
    pub fn dispatch(&self, event: EngineEvent) {
        if !self.is_enabled() {
            return;
        }
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        debug!(
            event_type = event.event_type(),
            listeners = listeners.len(),
            "Dispatching engine event"
        );
        for listener in listeners {
            listener.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn compensate() -> EngineEvent {
        EngineEvent::ActivityCompensate {
            activity_id: "undo".to_string(),
            execution_id: "e".to_string(),
            process_instance_id: "pi".to_string(),
            process_definition_id: "p:1".to_string(),
        }
    }

    #[test]
    fn test_listeners_receive_events_while_enabled() {
        let dispatcher = EngineEventDispatcher::new(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        dispatcher.add_listener(Arc::new(move |event: &EngineEvent| {
            s.lock().unwrap().push(event.event_type());
        }));

        dispatcher.dispatch(compensate());
        dispatcher.set_enabled(false);
        dispatcher.dispatch(compensate());

        assert_eq!(*seen.lock().unwrap(), vec!["ACTIVITY_COMPENSATE"]);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(compensate()).unwrap();
        assert_eq!(json["type"], "ACTIVITY_COMPENSATE");
        assert_eq!(json["activity_id"], "undo");
    }
}
