// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Commands and the pipeline that executes them.
//!
//! A [`Command`] is one unit of work. It runs inside a [`CommandContext`]
//! created (or reused) by the interceptor chain, and its body is scheduled
//! on the context's agenda like any other operation.

mod context;
pub mod interceptor;
mod invoker;
mod session;
pub mod transaction;

pub use context::{CommandContext, CommandContextCloseListener};
pub use interceptor::{
    CommandExecutor, CommandInterceptor, CommandInterceptorChainBuilder, CommandInvocation,
    CommandInvokerStage, Next,
};
pub use invoker::CommandInvoker;
pub use session::{Session, SessionFactories, SessionFactory, SessionRegistry};
pub use transaction::{
    StandaloneTransactionContextFactory, TransactionContext, TransactionContextFactory,
};

use crate::error::Result;

/// A unit of work producing a `T`.
///
/// Any closure `Fn(&mut CommandContext) -> Result<T>` is a command.
pub trait Command<T>: 'static {
    /// Run the command body.
    fn execute(&self, ctx: &mut CommandContext) -> Result<T>;
}

impl<T, F> Command<T> for F
where
    F: Fn(&mut CommandContext) -> Result<T> + 'static,
{
    fn execute(&self, ctx: &mut CommandContext) -> Result<T> {
        self(ctx)
    }
}

/// How a command relates to an already open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionPropagation {
    /// Join the current unit of work, or open one.
    #[default]
    Required,
    /// Always open a fresh unit of work.
    RequiresNew,
    /// Run without a transaction.
    NotSupported,
}

/// Per-invocation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandConfig {
    /// Whether a nested command may join the current context.
    pub context_reusable: bool,
    /// Transaction propagation.
    pub propagation: TransactionPropagation,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            context_reusable: true,
            propagation: TransactionPropagation::Required,
        }
    }
}

impl CommandConfig {
    /// Always run in a new context and transaction.
    pub fn transaction_requires_new() -> Self {
        Self {
            context_reusable: false,
            propagation: TransactionPropagation::RequiresNew,
        }
    }

    /// Run without opening a transaction.
    pub fn transaction_not_supported() -> Self {
        Self {
            context_reusable: true,
            propagation: TransactionPropagation::NotSupported,
        }
    }

    /// Copy with context reuse switched off.
    pub fn without_context_reuse(mut self) -> Self {
        self.context_reusable = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_joins_current_context() {
        let config = CommandConfig::default();
        assert!(config.context_reusable);
        assert_eq!(config.propagation, TransactionPropagation::Required);
    }

    #[test]
    fn test_requires_new_never_reuses() {
        let config = CommandConfig::transaction_requires_new();
        assert!(!config.context_reusable);
        assert_eq!(config.propagation, TransactionPropagation::RequiresNew);
    }

    #[test]
    fn test_not_supported_and_without_reuse() {
        let config = CommandConfig::transaction_not_supported().without_context_reuse();
        assert!(!config.context_reusable);
        assert_eq!(config.propagation, TransactionPropagation::NotSupported);
    }
}
