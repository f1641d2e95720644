// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background task execution.
//!
//! [`AsyncTaskExecutor`] is the seam; [`DefaultAsyncTaskExecutor`] runs
//! tasks on a bounded [`WorkerPool`]. Callers that must not fail under load
//! go through [`AsyncTaskInvoker`], which runs rejected tasks on the calling
//! thread instead.
//!
//! | Submission                        | Outcome when the pool is saturated       |
//! |-----------------------------------|------------------------------------------|
//! | `AsyncTaskExecutor::execute`      | `Err(RejectedTask)` with the task inside |
//! | `AsyncTaskExecutorExt::submit`    | `Err(EngineError::TaskRejected)`         |
//! | `AsyncTaskInvoker::execute/submit`| runs synchronously on the caller         |

mod invoker;
mod pool;

pub use invoker::AsyncTaskInvoker;
pub use pool::WorkerPool;

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::AsyncTaskExecutorConfig;
use crate::error::{EngineError, Result};

/// A unit of background work.
pub struct Task {
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

impl Task {
    /// Wrap a closure.
    pub fn new(job: impl FnOnce() + Send + 'static) -> Self {
        Self { job: Box::new(job) }
    }

    /// Run the task on the current thread.
    pub fn run(self) {
        (self.job)()
    }
}

/// Wrap `f` in a task whose outcome is delivered to the returned handle.
/// A panic inside `f` surfaces as [`EngineError::TaskPanicked`].
pub fn task_with_handle<T, F>(f: F) -> (Task, TaskHandle<T>)
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let task = Task::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| EngineError::TaskPanicked(panic_message(payload.as_ref())));
        // The caller may have dropped the handle.
        let _ = tx.send(outcome);
    });
    (task, TaskHandle { rx })
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Result of a submitted task.
///
/// Use [`get`](Self::get) from synchronous code or `.await` it from async
/// code. A task that is dropped without running resolves to
/// [`EngineError::TaskCancelled`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block the current thread until the task finished.
    ///
    /// Must not be called from inside an async runtime; await the handle there.
    pub fn get(self) -> Result<T> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(EngineError::TaskCancelled))
    }

    /// Return the outcome if the task already finished.
    pub fn try_get(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(EngineError::TaskCancelled)),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(EngineError::TaskCancelled)))
    }
}

/// Why a task was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectionReason {
    /// Every worker is busy and the queue is full.
    #[error("worker pool saturated")]
    QueueFull,
    /// The executor is shutting down.
    #[error("executor is shut down")]
    Shutdown,
    /// `start` was never called.
    #[error("executor not started")]
    NotStarted,
}

/// A task the executor refused, handed back to the submitter.
#[derive(Debug, Error)]
#[error("task rejected: {reason}")]
pub struct RejectedTask {
    task: Task,
    reason: RejectionReason,
}

impl RejectedTask {
    pub(crate) fn new(task: Task, reason: RejectionReason) -> Self {
        Self { task, reason }
    }

    /// Why the task was refused.
    pub fn reason(&self) -> RejectionReason {
        self.reason
    }

    /// Take the task back.
    pub fn into_task(self) -> Task {
        self.task
    }
}

impl From<RejectedTask> for EngineError {
    fn from(rejected: RejectedTask) -> Self {
        EngineError::TaskRejected(rejected.reason.to_string())
    }
}

/// Runs tasks off the calling thread.
pub trait AsyncTaskExecutor: Send + Sync {
    /// Prepare the executor. Tasks submitted before are rejected.
    fn start(&self);

    /// Hand a task over for background execution.
    fn execute(&self, task: Task) -> std::result::Result<(), RejectedTask>;

    /// Stop accepting tasks and wait (bounded) for queued ones.
    fn shutdown(&self);

    /// Whether `shutdown` was called.
    fn is_shutdown(&self) -> bool;
}

/// Result-returning submission on top of [`AsyncTaskExecutor`].
pub trait AsyncTaskExecutorExt: AsyncTaskExecutor {
    /// Run `f` in the background and return a handle to its result.
    fn submit<T, F>(&self, f: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (task, handle) = task_with_handle(f);
        self.execute(task)?;
        Ok(handle)
    }
}

impl<E: AsyncTaskExecutor + ?Sized> AsyncTaskExecutorExt for E {}

/// [`AsyncTaskExecutor`] backed by a [`WorkerPool`].
///
/// The pool is created by [`start`](AsyncTaskExecutor::start); if its
/// runtime cannot be built the executor stays unstarted and rejects tasks. An executor
/// built with [`with_pool`](Self::with_pool) uses an externally owned pool
/// and leaves it running on shutdown.
pub struct DefaultAsyncTaskExecutor {
    config: AsyncTaskExecutorConfig,
    pool: OnceLock<WorkerPool>,
    owns_pool: bool,
}

impl fmt::Debug for DefaultAsyncTaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultAsyncTaskExecutor")
            .field("config", &self.config)
            .field("started", &self.pool.get().is_some())
            .field("owns_pool", &self.owns_pool)
            .finish()
    }
}

impl DefaultAsyncTaskExecutor {
    /// Executor that creates its own pool on start.
    pub fn new(config: AsyncTaskExecutorConfig) -> Self {
        Self {
            config,
            pool: OnceLock::new(),
            owns_pool: true,
        }
    }

    /// Executor running on a pool owned by someone else.
    pub fn with_pool(pool: WorkerPool) -> Self {
        Self {
            config: pool.config().clone(),
            pool: OnceLock::from(pool),
            owns_pool: false,
        }
    }

    /// Pool settings.
    pub fn config(&self) -> &AsyncTaskExecutorConfig {
        &self.config
    }

    /// The pool, once started.
    pub fn pool(&self) -> Option<&WorkerPool> {
        self.pool.get()
    }
}

impl AsyncTaskExecutor for DefaultAsyncTaskExecutor {
    fn start(&self) {
        if self.pool.get().is_some() {
            return;
        }
        info!(
            core_pool_size = self.config.core_pool_size,
            max_pool_size = self.config.max_pool_size,
            queue_capacity = self.config.queue_capacity,
            "Starting async task executor"
        );
        match WorkerPool::new(self.config.clone()) {
            // A concurrent start may have won; the spare pool is dropped.
            Ok(pool) => {
                let _ = self.pool.set(pool);
            }
            Err(err) => {
                error!(error = %err, "Failed to start async task executor");
            }
        }
    }

    fn execute(&self, task: Task) -> std::result::Result<(), RejectedTask> {
        match self.pool.get() {
            Some(pool) => pool.execute(task),
            None => Err(RejectedTask::new(task, RejectionReason::NotStarted)),
        }
    }

    fn shutdown(&self) {
        let Some(pool) = self.pool.get() else {
            return;
        };
        if !self.owns_pool {
            debug!("Worker pool is externally owned, leaving it running");
            return;
        }

        info!("Shutting down async task executor");
        if !pool.shutdown(self.config.await_termination) {
            warn!(
                grace_period_ms = self.config.await_termination.as_millis() as u64,
                active = pool.active_count(),
                queued = pool.queue_len(),
                "Timed out waiting for async task executor to terminate"
            );
        }
    }

    fn is_shutdown(&self) -> bool {
        self.pool.get().is_some_and(WorkerPool::is_shutdown)
    }
}
