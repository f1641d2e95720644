// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command context lifecycle: close listeners, transactions, propagation.

mod common;

use common::*;
use runtara_engine::command::CommandContextCloseListener;
use runtara_engine::entity::ExecutionEntity;
use runtara_engine::{CommandConfig, CommandContext, EngineError, Result};

struct FailingOnClosing;

impl CommandContextCloseListener for FailingOnClosing {
    fn closing(&mut self, _ctx: &mut CommandContext) -> Result<()> {
        Err(EngineError::Engine("closing failed".to_string()))
    }
}

/// Registers another listener while being notified.
struct Registering {
    recorder: Recorder,
}

impl CommandContextCloseListener for Registering {
    fn closing(&mut self, ctx: &mut CommandContext) -> Result<()> {
        ctx.add_close_listener(RecordingCloseListener {
            label: "late",
            recorder: self.recorder.clone(),
        });
        Ok(())
    }
}

#[test]
fn test_successful_close_notifies_in_order_and_commits() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            ctx.add_close_listener(RecordingCloseListener {
                label: "a",
                recorder: log.clone(),
            });
            ctx.add_close_listener(RecordingCloseListener {
                label: "b",
                recorder: log.clone(),
            });
            Ok(())
        })
        .unwrap();

    assert_eq!(
        recorder.entries(),
        vec![
            "a:closing",
            "b:closing",
            "a:after_session_flushed",
            "b:after_session_flushed",
            "a:closed",
            "b:closed",
        ]
    );
    assert_eq!(test.transactions.entries(), vec!["open", "commit"]);
}

#[test]
fn test_failed_command_rolls_back_and_notifies_failure() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    let err = test
        .engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            ctx.add_close_listener(RecordingCloseListener {
                label: "a",
                recorder: log.clone(),
            });
            ctx.executions()?
                .insert(ExecutionEntity::new_process_instance("fail:1", None));
            Err(EngineError::IllegalArgument("bad input".to_string()))
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::IllegalArgument(_)));
    assert_eq!(recorder.entries(), vec!["a:close_failure"]);
    assert_eq!(test.transactions.entries(), vec!["open", "rollback"]);
    assert_eq!(test.persistence.execution_count(), 0);
}

#[test]
fn test_listener_failure_aborts_close() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    let err = test
        .engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            ctx.add_close_listener(FailingOnClosing);
            ctx.add_close_listener(RecordingCloseListener {
                label: "a",
                recorder: log.clone(),
            });
            ctx.executions()?
                .insert(ExecutionEntity::new_process_instance("fail:1", None));
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::Engine(ref message) if message == "closing failed"));
    // Remaining listeners of the phase still run, then the failure path.
    assert_eq!(recorder.entries(), vec!["a:closing", "a:close_failure"]);
    assert_eq!(test.transactions.entries(), vec!["open", "rollback"]);
    assert_eq!(test.persistence.execution_count(), 0);
}

#[test]
fn test_listener_added_during_notification_sees_later_phases() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            ctx.add_close_listener(Registering {
                recorder: log.clone(),
            });
            Ok(())
        })
        .unwrap();

    assert_eq!(
        recorder.entries(),
        vec!["late:after_session_flushed", "late:closed"]
    );
}

#[test]
fn test_sessions_flush_on_successful_close() {
    let test = TestEngine::new();

    let execution_id = test
        .engine
        .execute(|ctx: &mut CommandContext| -> Result<String> {
            let execution = ExecutionEntity::new_process_instance("flush:1", None);
            let id = execution.id.clone();
            ctx.executions()?.insert(execution);
            Ok(id)
        })
        .unwrap();

    assert_eq!(test.persistence.execution_count(), 1);
    assert!(test.engine.find_execution(&execution_id).unwrap().is_some());
}

#[test]
fn test_nested_default_config_shares_context_and_transaction() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            let nested = log.clone();
            ctx.execute(CommandConfig::default(), move |ctx: &mut CommandContext| -> Result<()> {
                ctx.add_close_listener(RecordingCloseListener {
                    label: "inner",
                    recorder: nested.clone(),
                });
                Ok(())
            })?;
            log.record("outer-done");
            Ok(())
        })
        .unwrap();

    // The inner listener belongs to the outer context and fires on its close.
    assert_eq!(
        recorder.entries(),
        vec![
            "outer-done",
            "inner:closing",
            "inner:after_session_flushed",
            "inner:closed",
        ]
    );
    assert_eq!(test.transactions.entries(), vec!["open", "commit"]);
}

#[test]
fn test_requires_new_isolates_inner_failure() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            let nested = log.clone();
            let inner = ctx.execute(
                CommandConfig::transaction_requires_new(),
                move |ctx: &mut CommandContext| -> Result<()> {
                    nested.record(format!("inner reused={}", ctx.is_reused()));
                    ctx.executions()?
                        .insert(ExecutionEntity::new_process_instance("inner:1", None));
                    Err(EngineError::Engine("inner failed".to_string()))
                },
            );
            log.record(format!("inner ok={}", inner.is_ok()));
            ctx.executions()?
                .insert(ExecutionEntity::new_process_instance("outer:1", None));
            Ok(())
        })
        .unwrap();

    assert_eq!(recorder.entries(), vec!["inner reused=false", "inner ok=false"]);
    assert_eq!(
        test.transactions.entries(),
        vec!["open", "open", "rollback", "commit"]
    );
    assert_eq!(test.persistence.execution_count(), 1);
}

#[test]
fn test_not_supported_opens_no_transaction() {
    let test = TestEngine::new();

    test.engine
        .execute_with(
            CommandConfig::transaction_not_supported(),
            |ctx: &mut CommandContext| -> Result<bool> { Ok(ctx.has_transaction()) },
        )
        .map(|has_transaction| assert!(!has_transaction))
        .unwrap();

    assert!(test.transactions.entries().is_empty());
}
