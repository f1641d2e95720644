// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtara Engine - Process Execution Core
//!
//! This crate provides the execution core of a business-process engine: every
//! state change runs as a [`Command`](command::Command) inside a
//! [`CommandContext`](command::CommandContext), whose agenda sequences the
//! work, and whose close sequence flushes sessions and completes the
//! transaction. Model parsing, history and job scheduling live elsewhere.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine (facade, builder)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ execute(config, command)
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LogInterceptor ─▶ CommandContextInterceptor ─▶ TransactionContext-     │
//! │                    (create / reuse / close)      Interceptor             │
//! │                                                        │                 │
//! │                                                        ▼                 │
//! │                                                  CommandInvoker          │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ plan + drain
//!                                    ▼
//! ┌───────────────────────┐      ┌─────────────────────────────────────────┐
//! │       Agenda          │─────▶│ Operations: command body, continue,      │
//! │   (FIFO, per context) │      │ trigger, inactive behaviors, custom      │
//! └───────────────────────┘      └─────────────────────────────────────────┘
//!           │                                        │
//!           ▼                                        ▼
//! ┌───────────────────────┐      ┌─────────────────────────────────────────┐
//! │  Sessions (entity     │      │ Event dispatch: signal / message /       │
//! │  managers) + stores   │      │ compensate handlers                      │
//! └───────────────────────┘      └─────────────────────────────────────────┘
//!                                                    │ async
//!                                                    ▼
//!                                ┌─────────────────────────────────────────┐
//!                                │ AsyncTaskInvoker ─▶ AsyncTaskExecutor    │
//!                                │ (caller-thread fallback)  (WorkerPool)   │
//!                                └─────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`command`] | Command trait, interceptor chain, context, sessions, transactions |
//! | [`agenda`] | Operation queue and drain loop |
//! | [`executor`] | Bounded worker pool, async task executor and invoker |
//! | [`event`] | Event handlers, subscription dispatch, engine events |
//! | [`commands`] | Built-in deploy / start / trigger / signal / message commands |
//! | [`persistence`] | Store traits, in-memory stores, per-context entity managers |
//! | [`entity`] | Executions and event subscriptions |
//! | [`model`] | Process definitions and activity behaviors |
//! | [`expression`] | Event name expressions |
//! | [`config`] | Environment-driven configuration |
//!
//! # Configuration
//!
//! See [`config::AsyncTaskExecutorConfig::from_env`] and
//! [`config::EngineConfig::from_env`] for the `RUNTARA_ENGINE_*` variables.

#![deny(missing_docs)]

/// Operation queue and drain loop.
pub mod agenda;

/// Command pipeline.
pub mod command;

/// Built-in commands.
pub mod commands;

/// Configuration loading from environment variables.
pub mod config;

/// Engine assembly and facade.
pub mod engine;

/// Executions and event subscriptions.
pub mod entity;

/// Error types.
pub mod error;

/// Event subscription dispatch.
pub mod event;

/// Background task execution.
pub mod executor;

/// Event name expressions.
pub mod expression;

/// Process model.
pub mod model;

/// Persistence interfaces.
pub mod persistence;

pub use command::{Command, CommandConfig, CommandContext, CommandExecutor, TransactionPropagation};
pub use config::{AsyncTaskExecutorConfig, EngineConfig};
pub use engine::{Engine, EngineBuilder, EngineServices};
pub use error::{EngineError, Result};
pub use executor::{AsyncTaskExecutor, AsyncTaskInvoker, DefaultAsyncTaskExecutor, TaskHandle};
pub use model::{ActivityBehavior, FlowElement, ProcessDefinition};
