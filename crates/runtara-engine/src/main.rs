// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtara Engine demo
//!
//! Builds an in-memory engine from the environment, deploys a process that
//! waits for a signal, starts an instance, and resumes it asynchronously.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::{error, info};

use runtara_engine::commands::{create_signal_subscription, delete_event_subscriptions_for_execution};
use runtara_engine::event::EngineEvent;
use runtara_engine::{
    ActivityBehavior, CommandContext, Engine, EngineConfig, FlowElement, ProcessDefinition,
};

/// Waits at a signal catch event and ends the execution once triggered.
struct SignalCatch;

impl ActivityBehavior for SignalCatch {
    fn execute(&self, ctx: &mut CommandContext, execution_id: &str) -> runtara_engine::Result<()> {
        let subscription = create_signal_subscription(ctx, execution_id, "wait")?;
        info!(
            execution_id,
            signal = ?subscription.event_name,
            "Waiting for signal"
        );
        Ok(())
    }

    fn is_triggerable(&self) -> bool {
        true
    }

    fn trigger(&self, ctx: &mut CommandContext, execution_id: &str) -> runtara_engine::Result<()> {
        delete_event_subscriptions_for_execution(ctx, execution_id, None)?;
        let execution = ctx.executions()?.get_mut(execution_id)?;
        info!(execution_id, variables = ?execution.variables, "Signal arrived");
        execution.end();
        Ok(())
    }
}

/// Moves a started execution from the start event to the wait state.
struct StartToWait;

impl ActivityBehavior for StartToWait {
    fn execute(&self, ctx: &mut CommandContext, execution_id: &str) -> runtara_engine::Result<()> {
        ctx.executions()?.get_mut(execution_id)?.set_activity("wait");
        ctx.agenda_mut().plan_continue_process(execution_id);
        Ok(())
    }
}

fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runtara_engine=info".parse()?),
        )
        .init();

    info!("Starting Runtara Engine demo");

    // Load configuration
    let config = EngineConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        core_pool_size = config.executor.core_pool_size,
        max_pool_size = config.executor.max_pool_size,
        queue_capacity = config.executor.queue_capacity,
        "Configuration loaded"
    );

    let engine = Engine::builder()
        .config(config)
        .event_listener(Arc::new(|event: &EngineEvent| {
            info!(event = %serde_json::to_string(event).unwrap_or_default(), "Engine event");
        }))
        .build()?;

    let definition = ProcessDefinition::builder("approval")
        .name("Approval")
        .signal("approvedSignal", "approved")
        .element(FlowElement::start_event("start").with_behavior(Arc::new(StartToWait)))
        .element(
            FlowElement::intermediate_catch_event("wait")
                .with_signal(Some("approvedSignal"), None)
                .with_behavior(Arc::new(SignalCatch)),
        )
        .build()?;
    engine.deploy(definition)?;

    let instance_id = engine.start_process_instance_by_key("approval")?;
    info!(%instance_id, "Process instance started");

    let delivered = engine.signal_event_received_async("approved", Some(json!({"by": "demo"})))?;
    info!(delivered, "Signal scheduled");

    // Shutdown drains the pool, so the dispatch has run before counting.
    engine.shutdown();

    let ended = engine
        .find_executions_by_process_instance(&instance_id)?
        .iter()
        .filter(|execution| execution.is_ended)
        .count();
    info!(%instance_id, ended, "Demo finished");
    Ok(())
}
