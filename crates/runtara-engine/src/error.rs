// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for runtara-engine.
//!
//! Every engine operation reports failures through [`EngineError`]. Callers see
//! the domain error that aborted their command unchanged; scheduling details
//! (agenda, operations) never appear in it.

use thiserror::Error;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the engine core.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// An entity was not found, usually because another unit of work deleted it.
    #[error("{kind} '{id}' not found")]
    ObjectNotFound {
        /// Entity kind (execution, event subscription, ...).
        kind: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Another unit of work updated the same entity concurrently.
    #[error("{kind} '{id}' was updated by another transaction concurrently")]
    ConcurrentModification {
        /// Entity kind.
        kind: &'static str,
        /// Entity ID.
        id: String,
    },

    /// Invalid input or configuration supplied by the caller.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// Generic domain failure.
    #[error("{0}")]
    Engine(String),

    /// A flow element referenced by an execution or subscription does not exist.
    #[error("Could not find flow element '{activity_id}' in process definition '{process_definition_id}'")]
    FlowElementNotFound {
        /// The process definition that was searched.
        process_definition_id: String,
        /// The missing activity ID.
        activity_id: String,
    },

    /// No process definition matches the given id or key.
    #[error("No process definition found for '{reference}'")]
    ProcessDefinitionNotFound {
        /// Definition id or key.
        reference: String,
    },

    /// The process definition is suspended and cannot start instances.
    #[error("Process definition '{process_definition_id}' is suspended")]
    ProcessDefinitionSuspended {
        /// The suspended definition.
        process_definition_id: String,
    },

    /// No event handler is registered for an event type.
    #[error("Could not find event handler for event of type '{event_type}'")]
    EventHandlerNotFound {
        /// The unhandled event type.
        event_type: String,
    },

    /// Resolving or dispatching an event subscription failed.
    #[error("Error while handling event subscription '{subscription_id}': {message}")]
    EventDispatch {
        /// The subscription being dispatched.
        subscription_id: String,
        /// What went wrong.
        message: String,
        /// Underlying failure, if any.
        #[source]
        source: Option<Box<EngineError>>,
    },

    /// The behavior of the execution's current activity cannot be triggered.
    #[error("Cannot trigger execution '{execution_id}': activity '{activity_id}' is not triggerable")]
    NotTriggerable {
        /// The execution that was triggered.
        execution_id: String,
        /// Its current activity.
        activity_id: String,
    },

    /// Expression evaluation failed.
    #[error("Error evaluating expression '{expression}': {message}")]
    Expression {
        /// The expression text.
        expression: String,
        /// Failure details.
        message: String,
    },

    /// The worker pool refused a task.
    #[error("Task rejected: {0}")]
    TaskRejected(String),

    /// A background task panicked.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// A background task was dropped before producing a result.
    #[error("Task was cancelled before completion")]
    TaskCancelled,

    /// Transaction demarcation failed.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Broken internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Shorthand for [`EngineError::ObjectNotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            kind,
            id: id.into(),
        }
    }

    /// Wrap a failure that happened while dispatching an event subscription.
    pub fn dispatch(
        subscription_id: impl Into<String>,
        message: impl Into<String>,
        source: Option<EngineError>,
    ) -> Self {
        Self::EventDispatch {
            subscription_id: subscription_id.into(),
            message: message.into(),
            source: source.map(Box::new),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::IllegalArgument(_) => "ILLEGAL_ARGUMENT",
            Self::Engine(_) => "ENGINE_ERROR",
            Self::FlowElementNotFound { .. } => "FLOW_ELEMENT_NOT_FOUND",
            Self::ProcessDefinitionNotFound { .. } => "PROCESS_DEFINITION_NOT_FOUND",
            Self::ProcessDefinitionSuspended { .. } => "PROCESS_DEFINITION_SUSPENDED",
            Self::EventHandlerNotFound { .. } => "EVENT_HANDLER_NOT_FOUND",
            Self::EventDispatch { .. } => "EVENT_DISPATCH_FAILED",
            Self::NotTriggerable { .. } => "NOT_TRIGGERABLE",
            Self::Expression { .. } => "EXPRESSION_ERROR",
            Self::TaskRejected(_) => "TASK_REJECTED",
            Self::TaskPanicked(_) => "TASK_PANICKED",
            Self::TaskCancelled => "TASK_CANCELLED",
            Self::Transaction(_) => "TRANSACTION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is an expected race between units of work rather
    /// than an engine defect. Such errors are logged at info level on close.
    pub fn is_expected_race(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound { .. }
                | Self::ConcurrentModification { .. }
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::IllegalArgument(format!("invalid JSON payload: {}", err))
    }
}
