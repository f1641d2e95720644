// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-unit-of-work resources keyed by their type.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::{EngineError, Result};

/// A resource opened lazily for one command context and flushed when the
/// context closes successfully.
pub trait Session: Any {
    /// Write pending changes.
    fn flush(&mut self) -> Result<()>;

    /// Release the session. Called once, after flush or on failure.
    fn close(&mut self) {}

    /// Downcast support for the registry.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Opens sessions of one concrete type.
pub trait SessionFactory: Send + Sync {
    /// `TypeId` of the session type this factory opens.
    fn session_type(&self) -> TypeId;

    /// Open a new session.
    fn open_session(&self) -> Box<dyn Session>;
}

/// Registered session factories, keyed by session type.
pub type SessionFactories = HashMap<TypeId, Arc<dyn SessionFactory>>;

/// Sessions opened by one command context, in creation order.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Vec<(TypeId, Box<dyn Session>)>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("open", &self.sessions.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Return the session of type `S`, opening it from `factories` on first use.
    pub fn get_or_open<S: Session>(&mut self, factories: &SessionFactories) -> Result<&mut S> {
        let type_id = TypeId::of::<S>();
        let index = match self.sessions.iter().position(|(id, _)| *id == type_id) {
            Some(index) => index,
            None => {
                let factory = factories.get(&type_id).ok_or_else(|| {
                    EngineError::Internal(format!(
                        "no session factory registered for {}",
                        type_name::<S>()
                    ))
                })?;
                self.sessions.push((type_id, factory.open_session()));
                self.sessions.len() - 1
            }
        };

        self.sessions[index]
            .1
            .as_any_mut()
            .downcast_mut::<S>()
            .ok_or_else(|| {
                EngineError::Internal(format!(
                    "session factory for {} opened a session of another type",
                    type_name::<S>()
                ))
            })
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session was opened.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Flush every session in creation order, stopping at the first failure.
    pub fn flush_all(&mut self) -> Result<()> {
        for (_, session) in &mut self.sessions {
            session.flush()?;
        }
        Ok(())
    }

    /// Close and forget every session.
    pub fn close_all(&mut self) {
        for (_, mut session) in self.sessions.drain(..) {
            session.close();
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            warn!(
                open_sessions = self.sessions.len(),
                "Session registry dropped with open sessions"
            );
            self.close_all();
        }
    }
}
