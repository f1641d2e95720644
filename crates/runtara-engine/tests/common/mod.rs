// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for runtara-engine integration tests.
//!
//! Provides TestEngine (an in-memory engine with a recorder shared by the
//! test behaviors, close listeners and event listener) plus a few behaviors
//! that move executions between flow elements and wait for events.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use runtara_engine::command::CommandContextCloseListener;
use runtara_engine::command::{TransactionContext, TransactionContextFactory};
use runtara_engine::commands::{
    create_message_subscription, create_signal_subscription,
    delete_event_subscriptions_for_execution,
};
use runtara_engine::event::EngineEvent;
use runtara_engine::persistence::{InMemoryPersistence, PersistenceStores};
use runtara_engine::{
    ActivityBehavior, AsyncTaskExecutorConfig, CommandContext, Engine, EngineConfig, Result,
};

/// Ordered log shared between a test and the code it observes.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Poll until at least `count` entries are recorded or `timeout` elapses.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        self.len() >= count
    }
}

/// Engine over a visible in-memory store.
pub struct TestEngine {
    pub engine: Engine,
    pub persistence: Arc<InMemoryPersistence>,
    pub events: Recorder,
    pub transactions: Recorder,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let persistence = Arc::new(InMemoryPersistence::new());
        let events = Recorder::new();
        let transactions = Recorder::new();

        let event_log = events.clone();
        let engine = Engine::builder()
            .config(config)
            .persistence(PersistenceStores::in_memory(persistence.clone()))
            .transaction_factory(Arc::new(RecordingTransactionFactory(transactions.clone())))
            .event_listener(Arc::new(move |event: &EngineEvent| {
                let entry = match event {
                    EngineEvent::ActivityCompensate { activity_id, .. } => {
                        format!("compensate:{}", activity_id)
                    }
                    EngineEvent::ActivityCancelled { activity_id, .. } => {
                        format!("cancelled:{}", activity_id)
                    }
                    EngineEvent::MessageReceived { message_name, .. } => {
                        format!("message:{}", message_name.as_deref().unwrap_or_default())
                    }
                };
                event_log.record(entry);
            }))
            .build()
            .expect("engine should build");

        Self {
            engine,
            persistence,
            events,
            transactions,
        }
    }
}

impl Drop for TestEngine {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        executor: AsyncTaskExecutorConfig::default()
            .with_core_pool_size(2)
            .with_max_pool_size(2)
            .with_queue_capacity(16)
            .with_await_termination(Duration::from_secs(5))
            .with_thread_name_format("engine-test-%d"),
        event_dispatcher_enabled: true,
    }
}

/// Records `open`, `commit` and `rollback`.
pub struct RecordingTransactionFactory(pub Recorder);

impl TransactionContextFactory for RecordingTransactionFactory {
    fn open_transaction(&self) -> Box<dyn TransactionContext> {
        self.0.record("open");
        Box::new(RecordingTransaction(self.0.clone()))
    }
}

struct RecordingTransaction(Recorder);

impl TransactionContext for RecordingTransaction {
    fn commit(&mut self) -> Result<()> {
        self.0.record("commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.0.record("rollback");
        Ok(())
    }
}

/// Records every close phase it sees, prefixed with a label.
pub struct RecordingCloseListener {
    pub label: &'static str,
    pub recorder: Recorder,
}

impl CommandContextCloseListener for RecordingCloseListener {
    fn closing(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        self.recorder.record(format!("{}:closing", self.label));
        Ok(())
    }

    fn after_session_flushed(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        self.recorder
            .record(format!("{}:after_session_flushed", self.label));
        Ok(())
    }

    fn closed(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        self.recorder.record(format!("{}:closed", self.label));
        Ok(())
    }

    fn close_failure(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        self.recorder.record(format!("{}:close_failure", self.label));
        Ok(())
    }
}

/// Moves the execution to `target` and continues there.
pub struct MoveTo {
    pub target: &'static str,
}

impl ActivityBehavior for MoveTo {
    fn execute(&self, ctx: &mut CommandContext, execution_id: &str) -> Result<()> {
        ctx.executions()?.get_mut(execution_id)?.set_activity(self.target);
        ctx.agenda_mut().plan_continue_process(execution_id);
        Ok(())
    }
}

/// What a [`WaitFor`] behavior subscribes to on entry.
#[derive(Debug, Clone, Copy)]
pub enum Wait {
    Signal,
    Message,
    Nothing,
}

/// Waits on `element` and ends the execution when triggered.
pub struct WaitFor {
    pub element: &'static str,
    pub wait: Wait,
    pub recorder: Recorder,
}

impl ActivityBehavior for WaitFor {
    fn execute(&self, ctx: &mut CommandContext, execution_id: &str) -> Result<()> {
        match self.wait {
            Wait::Signal => {
                create_signal_subscription(ctx, execution_id, self.element)?;
            }
            Wait::Message => {
                create_message_subscription(ctx, execution_id, self.element)?;
            }
            Wait::Nothing => {}
        }
        self.recorder.record(format!("enter:{}", self.element));
        Ok(())
    }

    fn is_triggerable(&self) -> bool {
        true
    }

    fn trigger(&self, ctx: &mut CommandContext, execution_id: &str) -> Result<()> {
        delete_event_subscriptions_for_execution(ctx, execution_id, None)?;
        ctx.executions()?.get_mut(execution_id)?.end();
        self.recorder.record(format!("trigger:{}", self.element));
        Ok(())
    }
}

/// Records its label every time it runs.
pub struct Record {
    pub label: &'static str,
    pub recorder: Recorder,
}

impl ActivityBehavior for Record {
    fn execute(&self, _ctx: &mut CommandContext, _execution_id: &str) -> Result<()> {
        self.recorder.record(self.label);
        Ok(())
    }
}
