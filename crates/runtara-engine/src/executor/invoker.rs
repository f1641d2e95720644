// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use super::{AsyncTaskExecutor, Task, TaskHandle, panic_message, task_with_handle};

/// Submits work to an [`AsyncTaskExecutor`], running it on the calling
/// thread whenever the executor refuses it.
#[derive(Clone)]
pub struct AsyncTaskInvoker {
    executor: Arc<dyn AsyncTaskExecutor>,
}

impl fmt::Debug for AsyncTaskInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTaskInvoker")
            .field("shutdown", &self.executor.is_shutdown())
            .finish()
    }
}

impl AsyncTaskInvoker {
    /// Wrap an executor.
    pub fn new(executor: Arc<dyn AsyncTaskExecutor>) -> Self {
        Self { executor }
    }

    /// The wrapped executor.
    pub fn executor(&self) -> &Arc<dyn AsyncTaskExecutor> {
        &self.executor
    }

    /// Run `f` in the background. If the executor rejects it, `f` runs
    /// before this call returns and the handle is already complete.
    pub fn submit<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (task, handle) = task_with_handle(f);
        if let Err(rejected) = self.executor.execute(task) {
            debug!(
                reason = %rejected.reason(),
                "Async task rejected, running on the calling thread"
            );
            rejected.into_task().run();
        }
        handle
    }

    /// Fire-and-forget variant of [`submit`](Self::submit).
    pub fn execute(&self, f: impl FnOnce() + Send + 'static) {
        if let Err(rejected) = self.executor.execute(Task::new(f)) {
            debug!(
                reason = %rejected.reason(),
                "Async task rejected, running on the calling thread"
            );
            let task = rejected.into_task();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
                error!(
                    panic = %panic_message(payload.as_ref()),
                    "Task run on the calling thread panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AsyncTaskExecutorConfig;
    use crate::executor::DefaultAsyncTaskExecutor;
    use std::sync::Mutex;
    use std::thread;

    #[test]
    fn test_not_started_executor_falls_back_to_caller() {
        let executor = Arc::new(DefaultAsyncTaskExecutor::new(
            AsyncTaskExecutorConfig::default(),
        ));
        let invoker = AsyncTaskInvoker::new(executor);

        let caller = thread::current().id();
        let handle = invoker.submit(move || thread::current().id() == caller);
        assert!(handle.get().unwrap());
    }

    #[test]
    fn test_execute_fallback_swallows_panics() {
        let executor = Arc::new(DefaultAsyncTaskExecutor::new(
            AsyncTaskExecutorConfig::default(),
        ));
        let invoker = AsyncTaskInvoker::new(executor);
        let ran = Arc::new(Mutex::new(false));

        invoker.execute(|| panic!("fallback failure"));
        let r = ran.clone();
        invoker.execute(move || *r.lock().unwrap() = true);

        assert!(*ran.lock().unwrap());
    }
}
