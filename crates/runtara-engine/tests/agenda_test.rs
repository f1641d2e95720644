// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agenda ordering, skip rules and nested command scheduling.

mod common;

use std::sync::Arc;

use common::*;
use runtara_engine::agenda::Operation;
use runtara_engine::entity::ExecutionEntity;
use runtara_engine::model::{FlowElement, ProcessDefinition};
use runtara_engine::{ActivityBehavior, CommandConfig, CommandContext, EngineError, Result};

fn recording_op(recorder: &Recorder, label: &'static str, execution_id: Option<String>) -> Operation {
    let recorder = recorder.clone();
    Operation::custom(label, execution_id, move |_ctx: &mut CommandContext| {
        recorder.record(label);
        Ok(())
    })
}

#[test]
fn test_operations_run_in_fifo_order_with_nested_planning() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            let inner = log.clone();
            let a1 = recording_op(&log, "A1", None);
            let a2 = recording_op(&log, "A2", None);
            ctx.agenda_mut().plan_operation(Operation::custom(
                "A",
                None,
                move |ctx: &mut CommandContext| {
                    inner.record("A");
                    ctx.agenda_mut().plan_operation(a1);
                    ctx.agenda_mut().plan_operation(a2);
                    Ok(())
                },
            ));
            ctx.agenda_mut().plan_operation(recording_op(&log, "B", None));
            Ok(())
        })
        .unwrap();

    assert_eq!(recorder.entries(), vec!["A", "B", "A1", "A2"]);
}

#[test]
fn test_operation_bound_to_ended_execution_is_skipped() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            let execution = ExecutionEntity::new_process_instance("skip:1", None);
            let execution_id = execution.id.clone();
            ctx.executions()?.insert(execution);

            let ender = log.clone();
            let target = execution_id.clone();
            ctx.agenda_mut().plan_operation(Operation::custom(
                "end",
                Some(execution_id.clone()),
                move |ctx: &mut CommandContext| {
                    ender.record("end");
                    ctx.executions()?.get_mut(&target)?.end();
                    Ok(())
                },
            ));
            ctx.agenda_mut()
                .plan_operation(recording_op(&log, "after-end", Some(execution_id)));
            ctx.agenda_mut()
                .plan_operation(recording_op(&log, "unbound", None));
            Ok(())
        })
        .unwrap();

    assert_eq!(recorder.entries(), vec!["end", "unbound"]);
}

#[test]
fn test_operation_bound_to_missing_execution_is_skipped() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            ctx.agenda_mut()
                .plan_operation(recording_op(&log, "ghost", Some("missing".to_string())));
            Ok(())
        })
        .unwrap();

    assert!(recorder.entries().is_empty());
}

#[test]
fn test_nested_command_runs_inline_while_agenda_has_work() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            let outer = log.clone();
            ctx.agenda_mut().plan_operation(Operation::custom(
                "op1",
                None,
                move |ctx: &mut CommandContext| {
                    outer.record("op1");
                    let nested = outer.clone();
                    ctx.execute(CommandConfig::default(), move |ctx: &mut CommandContext| -> Result<()> {
                        nested.record(format!("inner-body reused={}", ctx.is_reused()));
                        ctx.agenda_mut()
                            .plan_operation(recording_op(&nested, "inner-op", None));
                        Ok(())
                    })
                },
            ));
            ctx.agenda_mut().plan_operation(recording_op(&log, "op2", None));
            Ok(())
        })
        .unwrap();

    assert_eq!(
        recorder.entries(),
        vec!["op1", "inner-body reused=true", "op2", "inner-op"]
    );
}

#[test]
fn test_nested_command_drains_when_agenda_is_empty() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            let nested = log.clone();
            let value = ctx.execute(CommandConfig::default(), move |ctx: &mut CommandContext| -> Result<i32> {
                nested.record("inner-body");
                ctx.agenda_mut()
                    .plan_operation(recording_op(&nested, "inner-op", None));
                Ok(42)
            })?;
            log.record(format!("after-nested {}", value));
            Ok(())
        })
        .unwrap();

    assert_eq!(
        recorder.entries(),
        vec!["inner-body", "inner-op", "after-nested 42"]
    );
}

#[test]
fn test_failing_operation_aborts_drain() {
    let test = TestEngine::new();
    let recorder = Recorder::new();

    let log = recorder.clone();
    let err = test
        .engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            ctx.agenda_mut().plan_operation(Operation::custom(
                "boom",
                None,
                |_ctx: &mut CommandContext| Err(EngineError::Engine("boom".to_string())),
            ));
            ctx.agenda_mut()
                .plan_operation(recording_op(&log, "never", None));
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, EngineError::Engine(ref message) if message == "boom"));
    assert!(recorder.entries().is_empty());
}

#[test]
fn test_command_result_is_returned_through_the_chain() {
    let test = TestEngine::new();

    let value: String = test
        .engine
        .execute(|ctx: &mut CommandContext| -> Result<String> {
            ctx.agenda_mut().plan_operation(Operation::custom(
                "noop",
                None,
                |_ctx: &mut CommandContext| Ok(()),
            ));
            Ok("done".to_string())
        })
        .unwrap();

    assert_eq!(value, "done");
}

/// Records every reconcile call it receives, whether or not it asked for them.
struct Join {
    inactive_aware: bool,
    recorder: Recorder,
}

impl ActivityBehavior for Join {
    fn execute(&self, _ctx: &mut CommandContext, _execution_id: &str) -> Result<()> {
        Ok(())
    }

    fn is_inactive_aware(&self) -> bool {
        self.inactive_aware
    }

    fn execute_inactive(&self, _ctx: &mut CommandContext, execution_id: &str) -> Result<()> {
        self.recorder.record(format!("inactive:{}", execution_id));
        Ok(())
    }
}

fn deploy_joins(test: &TestEngine, recorder: &Recorder) -> String {
    let definition = ProcessDefinition::builder("joins")
        .element(FlowElement::start_event("start"))
        .element(FlowElement::task("join").with_behavior(Arc::new(Join {
            inactive_aware: true,
            recorder: recorder.clone(),
        })))
        .element(FlowElement::task("plain").with_behavior(Arc::new(Join {
            inactive_aware: false,
            recorder: recorder.clone(),
        })))
        .build()
        .unwrap();
    test.engine.deploy(definition).unwrap()
}

/// Insert a child execution of a new instance positioned at `element`.
fn insert_execution(
    ctx: &mut CommandContext,
    definition_id: &str,
    element: &str,
    is_active: bool,
) -> Result<String> {
    let instance = ExecutionEntity::new_process_instance(definition_id, None);
    let mut child = instance.new_child();
    child.set_activity(element);
    child.is_active = is_active;
    let child_id = child.id.clone();
    let executions = ctx.executions()?;
    executions.insert(instance);
    executions.insert(child);
    Ok(child_id)
}

#[test]
fn test_inactive_behaviors_run_once_after_the_drain() {
    let test = TestEngine::new();
    let recorder = Recorder::new();
    let definition_id = deploy_joins(&test, &recorder);

    let log = recorder.clone();
    let waiting = test
        .engine
        .execute(move |ctx: &mut CommandContext| -> Result<String> {
            let waiting = insert_execution(ctx, &definition_id, "join", false)?;
            let later = recording_op(&log, "later", None);
            let touch = log.clone();
            ctx.agenda_mut().plan_operation(Operation::custom(
                "touch",
                Some(waiting.clone()),
                move |ctx: &mut CommandContext| {
                    touch.record("touch");
                    ctx.agenda_mut().plan_operation(later);
                    Ok(())
                },
            ));
            Ok(waiting)
        })
        .unwrap();

    assert_eq!(
        recorder.entries(),
        vec![
            "touch".to_string(),
            "later".to_string(),
            format!("inactive:{}", waiting)
        ]
    );
}

#[test]
fn test_nested_command_does_not_plan_its_own_reconcile_pass() {
    let test = TestEngine::new();
    let recorder = Recorder::new();
    let definition_id = deploy_joins(&test, &recorder);

    let log = recorder.clone();
    let waiting = test
        .engine
        .execute(move |ctx: &mut CommandContext| -> Result<String> {
            let waiting = insert_execution(ctx, &definition_id, "join", false)?;
            let outer = log.clone();
            ctx.agenda_mut().plan_operation(Operation::custom(
                "touch",
                Some(waiting.clone()),
                move |ctx: &mut CommandContext| {
                    outer.record("touch");
                    // The agenda is empty here, so the nested command drains itself.
                    let nested = outer.clone();
                    ctx.execute(CommandConfig::default(), move |_ctx: &mut CommandContext| -> Result<()> {
                        nested.record("nested");
                        Ok(())
                    })
                },
            ));
            Ok(waiting)
        })
        .unwrap();

    assert_eq!(
        recorder.entries(),
        vec![
            "touch".to_string(),
            "nested".to_string(),
            format!("inactive:{}", waiting)
        ]
    );
}

#[test]
fn test_untouched_executions_are_not_reconciled() {
    let test = TestEngine::new();
    let recorder = Recorder::new();
    let definition_id = deploy_joins(&test, &recorder);

    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            insert_execution(ctx, &definition_id, "join", false)?;
            Ok(())
        })
        .unwrap();

    assert!(recorder.entries().is_empty());
}

#[test]
fn test_only_inactive_not_ended_executions_are_reconciled() {
    let test = TestEngine::new();
    let recorder = Recorder::new();
    let definition_id = deploy_joins(&test, &recorder);

    let waiting = test
        .engine
        .execute(move |ctx: &mut CommandContext| -> Result<String> {
            let waiting = insert_execution(ctx, &definition_id, "join", false)?;
            let active = insert_execution(ctx, &definition_id, "join", true)?;
            let ended = insert_execution(ctx, &definition_id, "join", false)?;

            for id in [&waiting, &active] {
                ctx.agenda_mut().plan_operation(Operation::custom(
                    "touch",
                    Some(id.clone()),
                    |_ctx: &mut CommandContext| Ok(()),
                ));
            }
            let target = ended.clone();
            ctx.agenda_mut().plan_operation(Operation::custom(
                "end",
                Some(ended),
                move |ctx: &mut CommandContext| {
                    ctx.executions()?.get_mut(&target)?.end();
                    Ok(())
                },
            ));
            Ok(waiting)
        })
        .unwrap();

    assert_eq!(recorder.entries(), vec![format!("inactive:{}", waiting)]);
}

#[test]
fn test_behaviors_that_are_not_inactive_aware_are_not_reconciled() {
    let test = TestEngine::new();
    let recorder = Recorder::new();
    let definition_id = deploy_joins(&test, &recorder);

    test.engine
        .execute(move |ctx: &mut CommandContext| -> Result<()> {
            let waiting = insert_execution(ctx, &definition_id, "plain", false)?;
            ctx.agenda_mut().plan_operation(Operation::custom(
                "touch",
                Some(waiting),
                |_ctx: &mut CommandContext| Ok(()),
            ));
            Ok(())
        })
        .unwrap();

    assert!(recorder.entries().is_empty());
}
