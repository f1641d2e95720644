// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Async task executor admission and the invoker's caller-thread fallback.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use runtara_engine::executor::{AsyncTaskExecutorExt, RejectionReason, Task};
use runtara_engine::{
    AsyncTaskExecutor, AsyncTaskExecutorConfig, AsyncTaskInvoker, DefaultAsyncTaskExecutor,
    EngineError,
};

type Gate = Arc<(Mutex<bool>, Condvar)>;

fn gate() -> Gate {
    Arc::new((Mutex::new(false), Condvar::new()))
}

fn wait_on(gate: &Gate) {
    let (lock, cvar) = &**gate;
    let mut open = lock.lock().unwrap();
    while !*open {
        open = cvar.wait(open).unwrap();
    }
}

fn open(gate: &Gate) {
    let (lock, cvar) = &**gate;
    *lock.lock().unwrap() = true;
    cvar.notify_all();
}

fn single_worker_executor() -> Arc<DefaultAsyncTaskExecutor> {
    let executor = Arc::new(DefaultAsyncTaskExecutor::new(
        AsyncTaskExecutorConfig::default()
            .with_core_pool_size(1)
            .with_max_pool_size(1)
            .with_queue_capacity(1)
            .with_await_termination(Duration::from_secs(5))
            .with_thread_name_format("invoker-test-%d"),
    ));
    executor.start();
    executor
}

fn thread_name() -> String {
    thread::current().name().unwrap_or_default().to_string()
}

#[test]
fn test_saturated_executor_runs_third_task_on_caller_thread() {
    let executor = single_worker_executor();
    let invoker = AsyncTaskInvoker::new(executor.clone());
    let release = gate();
    let (started_tx, started_rx) = mpsc::channel();

    let blocking = {
        let release = release.clone();
        invoker.submit(move || {
            started_tx.send(()).unwrap();
            wait_on(&release);
            thread_name()
        })
    };
    started_rx.recv().unwrap();

    let queued = invoker.submit(thread_name);
    let mut caller = invoker.submit(thread_name);

    // The rejected task already ran, before the worker was released.
    let on_caller = caller
        .try_get()
        .expect("fallback task completes before submit returns")
        .unwrap();
    assert_eq!(on_caller, thread_name());

    open(&release);
    assert!(blocking.get().unwrap().starts_with("invoker-test-"));
    assert!(queued.get().unwrap().starts_with("invoker-test-"));

    executor.shutdown();
}

#[test]
fn test_saturated_executor_reports_caller_thread_panic_through_handle() {
    let executor = single_worker_executor();
    let invoker = AsyncTaskInvoker::new(executor.clone());
    let release = gate();
    let (started_tx, started_rx) = mpsc::channel();

    let release_worker = release.clone();
    let blocking = invoker.submit(move || {
        started_tx.send(()).unwrap();
        wait_on(&release_worker);
    });
    started_rx.recv().unwrap();
    let queued = invoker.submit(|| ());

    let caller = thread_name();
    let mut failing = invoker.submit(move || -> u32 {
        panic!("boom on {}", thread_name());
    });

    let err = failing
        .try_get()
        .expect("fallback task completes before submit returns")
        .unwrap_err();
    assert!(matches!(err, EngineError::TaskPanicked(_)));
    assert!(err.to_string().contains(&format!("boom on {}", caller)));

    open(&release);
    blocking.get().unwrap();
    queued.get().unwrap();
    executor.shutdown();
}

#[test]
fn test_direct_submit_is_rejected_when_saturated() {
    let executor = single_worker_executor();
    let release = gate();
    let (started_tx, started_rx) = mpsc::channel();

    let release_worker = release.clone();
    let first = executor
        .submit(move || {
            started_tx.send(()).unwrap();
            wait_on(&release_worker);
        })
        .unwrap();
    started_rx.recv().unwrap();
    let second = executor.submit(|| ()).unwrap();

    let err = executor.submit(|| ()).unwrap_err();
    assert!(matches!(err, EngineError::TaskRejected(_)));

    open(&release);
    first.get().unwrap();
    second.get().unwrap();
    executor.shutdown();
}

#[test]
fn test_shutdown_drains_queue_and_falls_back_afterwards() {
    let executor = single_worker_executor();
    let invoker = AsyncTaskInvoker::new(executor.clone());
    let release = gate();
    let (started_tx, started_rx) = mpsc::channel();

    let release_worker = release.clone();
    let first = invoker.submit(move || {
        started_tx.send(()).unwrap();
        wait_on(&release_worker);
        1
    });
    started_rx.recv().unwrap();
    let queued = invoker.submit(|| 2);

    let opener = {
        let release = release.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            open(&release);
        })
    };
    executor.shutdown();
    opener.join().unwrap();

    assert!(executor.is_shutdown());
    assert_eq!(first.get().unwrap(), 1);
    assert_eq!(queued.get().unwrap(), 2);

    let rejected = executor
        .execute(Task::new(|| ()))
        .unwrap_err();
    assert_eq!(rejected.reason(), RejectionReason::Shutdown);

    let after = invoker.submit(thread_name);
    assert_eq!(after.get().unwrap(), thread_name());
}

#[test]
fn test_executor_not_started_rejects() {
    let executor = DefaultAsyncTaskExecutor::new(AsyncTaskExecutorConfig::default());
    let rejected = executor
        .execute(Task::new(|| ()))
        .unwrap_err();
    assert_eq!(rejected.reason(), RejectionReason::NotStarted);
    assert!(!executor.is_shutdown());
}

#[tokio::test]
async fn test_task_handle_can_be_awaited() {
    let executor = single_worker_executor();
    let invoker = AsyncTaskInvoker::new(executor.clone());

    let value = invoker.submit(|| 21 * 2).await.unwrap();
    assert_eq!(value, 42);

    executor.shutdown();
}
