// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transaction demarcation seam.
//!
//! The engine does not own a database connection. A [`TransactionContext`]
//! is opened by the transaction interceptor and committed or rolled back by
//! the command context when it closes. Hosts backed by a real database plug
//! in their own [`TransactionContextFactory`].

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// One open transaction.
pub trait TransactionContext {
    /// Commit the work of the unit of work.
    fn commit(&mut self) -> Result<()>;

    /// Undo the work of the unit of work.
    fn rollback(&mut self) -> Result<()>;
}

/// Opens transactions for new command contexts.
pub trait TransactionContextFactory: Send + Sync {
    /// Open a transaction.
    fn open_transaction(&self) -> Box<dyn TransactionContext>;
}

/// Transactions for engines without an external transaction manager.
///
/// Commit and rollback only log: stores are written when sessions flush.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneTransactionContextFactory;

impl TransactionContextFactory for StandaloneTransactionContextFactory {
    fn open_transaction(&self) -> Box<dyn TransactionContext> {
        let id = Uuid::new_v4();
        debug!(transaction_id = %id, "Opening standalone transaction");
        Box::new(StandaloneTransactionContext { id })
    }
}

#[derive(Debug)]
struct StandaloneTransactionContext {
    id: Uuid,
}

impl TransactionContext for StandaloneTransactionContext {
    fn commit(&mut self) -> Result<()> {
        debug!(transaction_id = %self.id, "Committing transaction");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        debug!(transaction_id = %self.id, "Rolling back transaction");
        Ok(())
    }
}
