// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded worker pool on a dedicated tokio runtime.
//!
//! Tasks run through `spawn_blocking` on the runtime's blocking threads,
//! capped at `max_pool_size`. Admission is bounded by a semaphore holding
//! `max_pool_size + queue_capacity` permits: a task that cannot take a
//! permit is rejected with [`RejectionReason::QueueFull`]. The permit is
//! released when the task finished, so at most `queue_capacity` tasks wait
//! while every thread is busy.
//!
//! Idle threads exit after `keep_alive`. With core-thread timeout disabled
//! they are kept for the lifetime of the pool.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::AsyncTaskExecutorConfig;
use crate::error::{EngineError, Result};

use super::{RejectedTask, RejectionReason, Task, panic_message};

const IDLE_FOREVER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

struct PoolInner {
    config: AsyncTaskExecutorConfig,
    runtime: Mutex<Option<Runtime>>,
    permits: Arc<Semaphore>,
    capacity: usize,
    shutdown: AtomicBool,
    active: AtomicUsize,
    completed: AtomicU64,
}

impl PoolInner {
    fn runtime(&self) -> MutexGuard<'_, Option<Runtime>> {
        self.runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    fn run_task(&self, task: Task) {
        self.active.fetch_add(1, Ordering::SeqCst);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            error!(
                thread = thread::current().name().unwrap_or("unnamed"),
                panic = %panic_message(payload.as_ref()),
                "Background task panicked"
            );
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Never block here; the last clone may be dropped inside an async context.
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

fn build_runtime(config: &AsyncTaskExecutorConfig) -> std::io::Result<Runtime> {
    let counter = Arc::new(AtomicUsize::new(0));
    let format = config.thread_name_format.clone();
    let keep_alive = if config.allow_core_thread_timeout {
        config.keep_alive
    } else {
        IDLE_FOREVER
    };

    Builder::new_multi_thread()
        .worker_threads(config.core_pool_size.max(1))
        .max_blocking_threads(config.max_pool_size.max(1))
        .thread_keep_alive(keep_alive)
        .thread_name_fn(move || {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            format.replace("%d", &n.to_string())
        })
        .build()
}

/// Thread pool with a bounded queue. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("active", &self.active_count())
            .field("queued", &self.queue_len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl WorkerPool {
    /// Build the pool's runtime. Threads are started on demand.
    pub fn new(config: AsyncTaskExecutorConfig) -> Result<Self> {
        let runtime = build_runtime(&config).map_err(|err| {
            EngineError::Internal(format!("failed to build worker pool runtime: {err}"))
        })?;
        let capacity = config.max_pool_size.max(1) + config.queue_capacity;

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                runtime: Mutex::new(Some(runtime)),
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                shutdown: AtomicBool::new(false),
                active: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
            }),
        })
    }

    /// Pool settings.
    pub fn config(&self) -> &AsyncTaskExecutorConfig {
        &self.inner.config
    }

    /// Submit a task. Rejected when the pool is shut down or saturated.
    pub fn execute(&self, task: Task) -> std::result::Result<(), RejectedTask> {
        // Spawning under the lock keeps admission and shutdown ordered.
        let runtime = self.inner.runtime();
        let Some(runtime) = runtime.as_ref() else {
            return Err(RejectedTask::new(task, RejectionReason::Shutdown));
        };

        let permit = match self.inner.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(
                    active = self.active_count(),
                    queued = self.queue_len(),
                    "Worker pool saturated, rejecting task"
                );
                return Err(RejectedTask::new(task, RejectionReason::QueueFull));
            }
        };

        let inner = self.inner.clone();
        runtime.spawn_blocking(move || {
            let _permit = permit;
            inner.run_task(task);
        });
        Ok(())
    }

    /// Stop admission and wait up to `timeout` for running and queued tasks.
    ///
    /// Returns `false` when tasks were still running at the deadline. Called
    /// from inside an async runtime it does not wait at all.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let runtime = {
            let mut guard = self.inner.runtime();
            self.inner.shutdown.store(true, Ordering::SeqCst);
            guard.take()
        };
        let Some(runtime) = runtime else {
            return self.inner.in_flight() == 0;
        };

        if Handle::try_current().is_ok() {
            warn!("Worker pool shut down from an async context, not waiting for tasks");
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(timeout);
        }
        self.inner.in_flight() == 0
    }

    /// Whether `shutdown` was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Tasks currently running.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Tasks admitted but not started yet.
    pub fn queue_len(&self) -> usize {
        self.inner.in_flight().saturating_sub(self.active_count())
    }

    /// Tasks finished since the pool was created.
    pub fn completed_count(&self) -> u64 {
        self.inner.completed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Condvar;
    use std::sync::mpsc;
    use std::time::Instant;

    fn config(core: usize, max: usize, queue: usize) -> AsyncTaskExecutorConfig {
        AsyncTaskExecutorConfig::default()
            .with_core_pool_size(core)
            .with_max_pool_size(max)
            .with_queue_capacity(queue)
            .with_keep_alive(Duration::from_millis(50))
            .with_thread_name_format("test-pool-%d")
    }

    fn blocking_task(release: &Arc<(Mutex<bool>, Condvar)>, started: &mpsc::Sender<String>) -> Task {
        let release = release.clone();
        let started = started.clone();
        Task::new(move || {
            let name = thread::current().name().unwrap_or_default().to_string();
            let _ = started.send(name);
            let (lock, cvar) = &*release;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
        })
    }

    fn open_gate(release: &Arc<(Mutex<bool>, Condvar)>) {
        let (lock, cvar) = &**release;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    #[test]
    fn test_saturation_rejects_beyond_max_plus_queue() {
        let pool = WorkerPool::new(config(1, 2, 1)).unwrap();
        let release = Arc::new((Mutex::new(false), Condvar::new()));
        let (tx, rx) = mpsc::channel();

        pool.execute(blocking_task(&release, &tx)).unwrap();
        pool.execute(blocking_task(&release, &tx)).unwrap();
        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert!(first.starts_with("test-pool-"));
        assert_ne!(first, second);
        assert_eq!(pool.active_count(), 2);

        pool.execute(blocking_task(&release, &tx)).unwrap();
        assert_eq!(pool.queue_len(), 1);

        let rejected = pool.execute(Task::new(|| {})).unwrap_err();
        assert_eq!(rejected.reason(), RejectionReason::QueueFull);

        open_gate(&release);
        assert!(pool.shutdown(Duration::from_secs(5)));
        assert_eq!(pool.completed_count(), 3);
    }

    #[test]
    fn test_finished_task_frees_a_slot() {
        let pool = WorkerPool::new(config(1, 1, 1)).unwrap();
        let release = Arc::new((Mutex::new(false), Condvar::new()));
        let (tx, rx) = mpsc::channel();

        pool.execute(blocking_task(&release, &tx)).unwrap();
        rx.recv().unwrap();
        pool.execute(Task::new(|| {})).unwrap();
        assert!(pool.execute(Task::new(|| {})).is_err());

        open_gate(&release);
        assert!(wait_until(|| pool.inner.in_flight() == 0));
        pool.execute(Task::new(|| {})).unwrap();
        assert!(pool.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn test_shutdown_rejects_and_drains_queue() {
        let pool = WorkerPool::new(config(1, 1, 4)).unwrap();
        let release = Arc::new((Mutex::new(false), Condvar::new()));
        let (tx, rx) = mpsc::channel();

        pool.execute(blocking_task(&release, &tx)).unwrap();
        rx.recv().unwrap();
        for _ in 0..3 {
            pool.execute(blocking_task(&release, &tx)).unwrap();
        }

        let opener = {
            let release = release.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                open_gate(&release);
            })
        };
        assert!(pool.shutdown(Duration::from_secs(5)));
        opener.join().unwrap();

        let rejected = pool.execute(Task::new(|| {})).unwrap_err();
        assert_eq!(rejected.reason(), RejectionReason::Shutdown);
        assert_eq!(pool.completed_count(), 4);
        assert!(pool.is_shutdown());
    }

    #[test]
    fn test_shutdown_times_out_with_busy_worker() {
        let pool = WorkerPool::new(config(1, 1, 1)).unwrap();
        let release = Arc::new((Mutex::new(false), Condvar::new()));
        let (tx, rx) = mpsc::channel();

        pool.execute(blocking_task(&release, &tx)).unwrap();
        rx.recv().unwrap();

        assert!(!pool.shutdown(Duration::from_millis(50)));
        assert_eq!(pool.active_count(), 1);

        open_gate(&release);
        assert!(wait_until(|| pool.completed_count() == 1));
    }

    #[test]
    fn test_panicking_task_keeps_pool_usable() {
        let pool = WorkerPool::new(config(1, 1, 4)).unwrap();
        pool.execute(Task::new(|| panic!("task failure"))).unwrap();

        let (tx, rx) = mpsc::channel();
        pool.execute(Task::new(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        }))
        .unwrap();

        let name = rx.recv().unwrap().unwrap_or_default();
        assert!(name.starts_with("test-pool-"));
        assert!(wait_until(|| pool.completed_count() == 2));
        assert!(pool.shutdown(Duration::from_secs(5)));
    }
}
