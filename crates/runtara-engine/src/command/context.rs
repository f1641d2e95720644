// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The unit-of-work aggregate.

use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::agenda::Agenda;
use crate::engine::EngineServices;
use crate::error::{EngineError, Result};
use crate::model::ProcessDefinition;
use crate::persistence::{EventSubscriptionEntityManager, ExecutionEntityManager};

use super::{
    Command, CommandConfig, CommandExecutor, Session, SessionRegistry, TransactionContext,
};

/// Hooks into the close sequence of a [`CommandContext`].
///
/// Every method defaults to doing nothing. An error returned by a listener
/// is recorded on the context (unless one is recorded already) and the
/// remaining listeners still run.
pub trait CommandContextCloseListener {
    /// Before sessions are flushed.
    fn closing(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }

    /// After sessions were flushed and the transaction committed.
    fn after_session_flushed(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }

    /// After a successful close.
    fn closed(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }

    /// After the transaction was rolled back because of a failure.
    fn close_failure(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ClosePhase {
    Closing,
    AfterSessionFlushed,
    Closed,
    CloseFailure,
}

/// State of one unit of work: agenda, sessions, transaction, close
/// listeners, the result stack and the executions touched so far.
///
/// A context is owned by the thread that created it. Nested commands reach
/// it through [`CommandContext::execute`].
pub struct CommandContext {
    services: Arc<EngineServices>,
    executor: CommandExecutor,
    agenda: Agenda,
    sessions: SessionRegistry,
    transaction: Option<Box<dyn TransactionContext>>,
    close_listeners: Vec<Box<dyn CommandContextCloseListener>>,
    results: Vec<Box<dyn Any>>,
    involved_executions: Vec<String>,
    exception: Option<EngineError>,
    reused: bool,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("agenda", &self.agenda)
            .field("sessions", &self.sessions)
            .field("has_transaction", &self.transaction.is_some())
            .field("close_listeners", &self.close_listeners.len())
            .field("involved_executions", &self.involved_executions)
            .field("exception", &self.exception)
            .field("reused", &self.reused)
            .finish_non_exhaustive()
    }
}

impl CommandContext {
    pub(crate) fn new(services: Arc<EngineServices>, executor: CommandExecutor) -> Self {
        Self {
            services,
            executor,
            agenda: Agenda::default(),
            sessions: SessionRegistry::default(),
            transaction: None,
            close_listeners: Vec::new(),
            results: Vec::new(),
            involved_executions: Vec::new(),
            exception: None,
            reused: false,
        }
    }

    /// Engine-wide services.
    pub fn services(&self) -> &Arc<EngineServices> {
        &self.services
    }

    /// The executor this context was created by.
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// The operation queue.
    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    /// Mutable access to the operation queue.
    pub fn agenda_mut(&mut self) -> &mut Agenda {
        &mut self.agenda
    }

    /// Run a nested command with this context as the reuse candidate.
    pub fn execute<T: 'static>(
        &mut self,
        config: CommandConfig,
        command: impl Command<T>,
    ) -> Result<T> {
        let executor = self.executor.clone();
        executor.execute_in(config, command, Some(self))
    }

    /// The session of type `S`, opened on first use.
    pub fn session<S: Session>(&mut self) -> Result<&mut S> {
        let factories = &self.services.session_factories;
        self.sessions.get_or_open::<S>(factories)
    }

    /// Execution entity manager of this unit of work.
    pub fn executions(&mut self) -> Result<&mut ExecutionEntityManager> {
        self.session::<ExecutionEntityManager>()
    }

    /// Event subscription entity manager of this unit of work.
    pub fn event_subscriptions(&mut self) -> Result<&mut EventSubscriptionEntityManager> {
        self.session::<EventSubscriptionEntityManager>()
    }

    /// Load a deployed process definition.
    pub fn process_definition(&self, id: &str) -> Result<Arc<ProcessDefinition>> {
        self.services
            .stores()
            .definitions
            .find_definition(id)?
            .ok_or_else(|| EngineError::ProcessDefinitionNotFound {
                reference: id.to_string(),
            })
    }

    /// Register a close listener.
    pub fn add_close_listener(&mut self, listener: impl CommandContextCloseListener + 'static) {
        self.close_listeners.push(Box::new(listener));
    }

    /// Whether the current command joined an existing context.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub(crate) fn set_reused(&mut self, reused: bool) -> bool {
        mem::replace(&mut self.reused, reused)
    }

    pub(crate) fn push_result(&mut self, result: Box<dyn Any>) {
        self.results.push(result);
    }

    pub(crate) fn pop_result(&mut self) -> Option<Box<dyn Any>> {
        self.results.pop()
    }

    /// Record that an operation touched an execution.
    pub fn add_involved_execution(&mut self, execution_id: &str) {
        if !self.involved_executions.iter().any(|id| id == execution_id) {
            self.involved_executions.push(execution_id.to_string());
        }
    }

    /// Executions touched by operations of this context, in first-touch order.
    pub fn involved_executions(&self) -> &[String] {
        &self.involved_executions
    }

    /// Whether a transaction is open.
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub(crate) fn set_transaction(&mut self, transaction: Box<dyn TransactionContext>) {
        self.transaction = Some(transaction);
    }

    /// The failure recorded for this unit of work, if any.
    pub fn exception(&self) -> Option<&EngineError> {
        self.exception.as_ref()
    }

    /// Record a failure. Only the first one is kept.
    pub fn set_exception(&mut self, exception: EngineError) {
        if self.exception.is_none() {
            self.exception = Some(exception);
        } else {
            debug!(error = %exception, "Ignoring secondary failure in command context");
        }
    }

    fn notify(&mut self, phase: ClosePhase) {
        let mut listeners = mem::take(&mut self.close_listeners);
        for listener in listeners.iter_mut() {
            let outcome = match phase {
                ClosePhase::Closing => listener.closing(self),
                ClosePhase::AfterSessionFlushed => listener.after_session_flushed(self),
                ClosePhase::Closed => listener.closed(self),
                ClosePhase::CloseFailure => listener.close_failure(self),
            };
            if let Err(error) = outcome {
                debug!(?phase, error = %error, "Close listener failed");
                self.set_exception(error);
            }
        }
        // Listeners registered while notifying run from the next phase on.
        listeners.append(&mut self.close_listeners);
        self.close_listeners = listeners;
    }

    /// Finish the unit of work.
    ///
    /// On success: `closing` listeners, session flush, commit,
    /// `after_session_flushed` and `closed` listeners. On a recorded failure:
    /// rollback and `close_failure` listeners. Sessions are closed in both
    /// cases and the recorded failure is logged and returned.
    pub fn close(mut self) -> Result<()> {
        let mut committed = false;

        if self.exception.is_none() {
            self.notify(ClosePhase::Closing);
        }
        if self.exception.is_none() {
            if let Err(error) = self.sessions.flush_all() {
                self.set_exception(error);
            }
        }
        if self.exception.is_none() {
            if let Some(transaction) = self.transaction.as_mut() {
                match transaction.commit() {
                    Ok(()) => committed = true,
                    Err(error) => self.set_exception(error),
                }
            }
        }
        if self.exception.is_none() {
            self.notify(ClosePhase::AfterSessionFlushed);
        }
        if self.exception.is_none() {
            self.notify(ClosePhase::Closed);
        }

        if self.exception.is_some() {
            if !committed {
                if let Some(transaction) = self.transaction.as_mut() {
                    if let Err(error) = transaction.rollback() {
                        error!(error = %error, "Transaction rollback failed");
                    }
                }
            }
            self.notify(ClosePhase::CloseFailure);
        }

        self.sessions.close_all();

        match self.exception.take() {
            None => Ok(()),
            Some(exception) => {
                if exception.is_expected_race() {
                    info!(
                        error_code = exception.error_code(),
                        error = %exception,
                        "Command context closed with an expected concurrency exception"
                    );
                } else {
                    error!(
                        error_code = exception.error_code(),
                        error = %exception,
                        "Error while closing command context"
                    );
                }
                Err(exception)
            }
        }
    }
}
