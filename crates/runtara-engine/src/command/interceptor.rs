// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command interceptor chain.
//!
//! ```text
//! execute(config, command)
//!     │
//!     ▼
//! LogInterceptor ─▶ CommandContextInterceptor ─▶ TransactionContextInterceptor ─▶ CommandInvoker
//!                   (create / reuse / close)      (open transaction)               (agenda drain)
//! ```
//!
//! The chain is assembled once by [`CommandInterceptorChainBuilder`] and is
//! immutable afterwards. The terminal stage implements
//! [`CommandInvokerStage`], which has no successor, so nothing can be placed
//! behind it.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use tracing::{Level, debug, span};

use crate::engine::EngineServices;
use crate::error::{EngineError, Result};

use super::{
    Command, CommandConfig, CommandContext, TransactionContextFactory, TransactionPropagation,
};

pub(crate) type CommandBody = Box<dyn FnOnce(&mut CommandContext) -> Result<()>>;

/// A command travelling down the chain.
pub struct CommandInvocation<'a> {
    /// Invocation settings. Interceptors may adjust them for downstream stages.
    pub config: CommandConfig,
    /// Command type name, for logging.
    pub name: &'static str,
    /// The context the command runs in: the caller's context on entry,
    /// the installed one after the context interceptor.
    pub context: Option<&'a mut CommandContext>,
    pub(crate) body: CommandBody,
}

impl fmt::Debug for CommandInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandInvocation")
            .field("config", &self.config)
            .field("name", &self.name)
            .field("has_context", &self.context.is_some())
            .finish_non_exhaustive()
    }
}

impl CommandInvocation<'_> {
    /// Same command and config, running in `context`.
    pub fn with_context<'b>(
        self,
        context: Option<&'b mut CommandContext>,
    ) -> CommandInvocation<'b> {
        CommandInvocation {
            config: self.config,
            name: self.name,
            context,
            body: self.body,
        }
    }
}

/// A link of the chain.
pub trait CommandInterceptor: Send + Sync {
    /// Handle the invocation, usually by delegating to `next`.
    fn execute(&self, invocation: CommandInvocation<'_>, next: Next<'_>) -> Result<Box<dyn Any>>;
}

/// The terminal stage of the chain.
pub trait CommandInvokerStage: Send + Sync {
    /// Run the command.
    fn invoke(&self, invocation: CommandInvocation<'_>) -> Result<Box<dyn Any>>;
}

/// The remainder of the chain after the current interceptor.
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn CommandInterceptor>],
    invoker: &'a dyn CommandInvokerStage,
    executor: &'a CommandExecutor,
}

impl Next<'_> {
    /// The executor owning the chain.
    pub fn executor(&self) -> &CommandExecutor {
        self.executor
    }

    /// Pass the invocation on.
    pub fn run(self, invocation: CommandInvocation<'_>) -> Result<Box<dyn Any>> {
        match self.interceptors.split_first() {
            Some((head, rest)) => head.execute(
                invocation,
                Next {
                    interceptors: rest,
                    invoker: self.invoker,
                    executor: self.executor,
                },
            ),
            None => self.invoker.invoke(invocation),
        }
    }
}

struct Chain {
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
    invoker: Arc<dyn CommandInvokerStage>,
}

/// Entry point into an immutable interceptor chain. Cheap to clone.
#[derive(Clone)]
pub struct CommandExecutor {
    chain: Arc<Chain>,
    default_config: CommandConfig,
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("interceptors", &self.chain.interceptors.len())
            .field("default_config", &self.default_config)
            .finish()
    }
}

impl CommandExecutor {
    /// Config used by [`execute_default`](Self::execute_default).
    pub fn default_config(&self) -> CommandConfig {
        self.default_config
    }

    /// Run a top-level command with the default config.
    pub fn execute_default<T: 'static>(&self, command: impl Command<T>) -> Result<T> {
        self.execute_in(self.default_config, command, None)
    }

    /// Run a top-level command.
    pub fn execute<T: 'static>(&self, config: CommandConfig, command: impl Command<T>) -> Result<T> {
        self.execute_in(config, command, None)
    }

    pub(crate) fn execute_in<T: 'static, C: Command<T>>(
        &self,
        config: CommandConfig,
        command: C,
        context: Option<&mut CommandContext>,
    ) -> Result<T> {
        let body: CommandBody = Box::new(move |ctx: &mut CommandContext| {
            let value = command.execute(ctx)?;
            ctx.push_result(Box::new(value));
            Ok(())
        });
        let invocation = CommandInvocation {
            config,
            name: type_name::<C>(),
            context,
            body,
        };
        let next = Next {
            interceptors: &self.chain.interceptors,
            invoker: self.chain.invoker.as_ref(),
            executor: self,
        };

        let result = next.run(invocation)?;
        result
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| {
                EngineError::Internal(format!(
                    "command {} produced a result of an unexpected type",
                    type_name::<C>()
                ))
            })
    }
}

/// Ordered builder for a [`CommandExecutor`].
#[derive(Default)]
pub struct CommandInterceptorChainBuilder {
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
    default_config: CommandConfig,
}

impl fmt::Debug for CommandInterceptorChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandInterceptorChainBuilder")
            .field("interceptors", &self.interceptors.len())
            .field("default_config", &self.default_config)
            .finish()
    }
}

impl CommandInterceptorChainBuilder {
    /// Start an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor.
    pub fn interceptor(mut self, interceptor: impl CommandInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append a shared interceptor.
    pub fn shared_interceptor(mut self, interceptor: Arc<dyn CommandInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Config for [`CommandExecutor::execute_default`].
    pub fn default_config(mut self, config: CommandConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Close the chain with its terminal stage.
    pub fn build(self, invoker: impl CommandInvokerStage + 'static) -> CommandExecutor {
        CommandExecutor {
            chain: Arc::new(Chain {
                interceptors: self.interceptors,
                invoker: Arc::new(invoker),
            }),
            default_config: self.default_config,
        }
    }
}

/// Wraps every command in a debug span.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogInterceptor;

impl CommandInterceptor for LogInterceptor {
    fn execute(&self, invocation: CommandInvocation<'_>, next: Next<'_>) -> Result<Box<dyn Any>> {
        if !tracing::enabled!(Level::DEBUG) {
            return next.run(invocation);
        }

        let span = span!(Level::DEBUG, "command", command = invocation.name);
        let _guard = span.enter();
        debug!(config = ?invocation.config, "Starting command");
        let result = next.run(invocation);
        match &result {
            Ok(_) => debug!("Command finished"),
            Err(error) => debug!(error = %error, "Command failed"),
        }
        result
    }
}

/// Installs the command context.
///
/// A nested command joins the caller's context when its config allows reuse
/// and does not require a new transaction. Otherwise a fresh context is
/// created, the command runs in it, and the context is closed afterwards
/// with the command's failure (if any) recorded on it.
pub struct CommandContextInterceptor {
    services: Arc<EngineServices>,
}

impl fmt::Debug for CommandContextInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContextInterceptor")
            .finish_non_exhaustive()
    }
}

impl CommandContextInterceptor {
    /// Create contexts backed by `services`.
    pub fn new(services: Arc<EngineServices>) -> Self {
        Self { services }
    }
}

impl CommandInterceptor for CommandContextInterceptor {
    fn execute(&self, mut invocation: CommandInvocation<'_>, next: Next<'_>) -> Result<Box<dyn Any>> {
        let reusable = invocation.config.context_reusable
            && invocation.config.propagation != TransactionPropagation::RequiresNew;

        if reusable {
            if let Some(ctx) = invocation.context.take() {
                debug!(command = invocation.name, "Reusing command context");
                let previous = ctx.set_reused(true);
                let result = next.run(invocation.with_context(Some(&mut *ctx)));
                ctx.set_reused(previous);
                return result;
            }
        }

        let mut ctx = CommandContext::new(self.services.clone(), next.executor().clone());
        let result = next.run(invocation.with_context(Some(&mut ctx)));
        if let Err(error) = &result {
            ctx.set_exception(error.clone());
        }

        let closed = ctx.close();
        match (result, closed) {
            (Err(error), _) => Err(error),
            (Ok(_), Err(error)) => Err(error),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

/// Opens a transaction on contexts that have none.
pub struct TransactionContextInterceptor {
    factory: Arc<dyn TransactionContextFactory>,
}

impl fmt::Debug for TransactionContextInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContextInterceptor")
            .finish_non_exhaustive()
    }
}

impl TransactionContextInterceptor {
    /// Open transactions from `factory`.
    pub fn new(factory: Arc<dyn TransactionContextFactory>) -> Self {
        Self { factory }
    }
}

impl CommandInterceptor for TransactionContextInterceptor {
    fn execute(&self, mut invocation: CommandInvocation<'_>, next: Next<'_>) -> Result<Box<dyn Any>> {
        if invocation.config.propagation != TransactionPropagation::NotSupported {
            if let Some(ctx) = invocation.context.as_deref_mut() {
                if !ctx.has_transaction() {
                    ctx.set_transaction(self.factory.open_transaction());
                }
            }
        }
        next.run(invocation)
    }
}
