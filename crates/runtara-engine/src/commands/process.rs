// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deployment, instance start and trigger commands.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::command::{Command, CommandContext, CommandContextCloseListener};
use crate::entity::{EventSubscriptionEntity, ExecutionEntity, MESSAGE_EVENT, SIGNAL_EVENT};
use crate::error::{EngineError, Result};
use crate::event::{determine_message_name, determine_signal_name};
use crate::model::{EventDefinition, ProcessDefinition};

/// Create a process instance of `definition` with one child execution
/// positioned at `element_id`.
///
/// Returns `(process_instance_id, execution_id)`. Nothing is planned; the
/// caller decides how the new execution continues.
pub fn create_process_instance_at(
    ctx: &mut CommandContext,
    definition: &ProcessDefinition,
    element_id: &str,
    variables: Option<&Map<String, Value>>,
    tenant_id: Option<&str>,
) -> Result<(String, String)> {
    definition.require_flow_element(element_id)?;

    let mut instance = ExecutionEntity::new_process_instance(&definition.id, tenant_id);
    instance.set_activity(element_id);
    if let Some(variables) = variables {
        instance.set_variables(variables);
    }

    let mut execution = instance.new_child();
    execution.set_activity(element_id);

    let ids = (instance.id.clone(), execution.id.clone());
    let executions = ctx.executions()?;
    executions.insert(instance);
    executions.insert(execution);

    debug!(
        process_definition_id = %definition.id,
        process_instance_id = %ids.0,
        element_id,
        "Created process instance"
    );
    Ok(ids)
}

/// Deploy a process definition.
///
/// Registers the definition and replaces the start-event subscriptions of
/// the previous version of the same key with subscriptions for the signal
/// and message start events of the new one. Returns the definition id.
#[derive(Debug, Clone)]
pub struct DeployProcessDefinitionCmd {
    definition: Arc<ProcessDefinition>,
}

impl DeployProcessDefinitionCmd {
    /// Deploy `definition`.
    pub fn new(definition: ProcessDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
        }
    }
}

impl Command<String> for DeployProcessDefinitionCmd {
    fn execute(&self, ctx: &mut CommandContext) -> Result<String> {
        let definition = self.definition.clone();
        let definitions = ctx.services().stores().definitions.clone();

        if definitions.find_definition(&definition.id)?.is_some() {
            return Err(EngineError::IllegalArgument(format!(
                "process definition '{}' is already deployed",
                definition.id
            )));
        }

        let previous =
            definitions.find_latest_definition_by_key(&definition.key, definition.tenant_id.as_deref())?;
        if let Some(previous) = &previous {
            if previous.version >= definition.version {
                return Err(EngineError::IllegalArgument(format!(
                    "process definition '{}' must have a version above {}",
                    definition.id, previous.version
                )));
            }
            let stale = ctx
                .event_subscriptions()?
                .find_by_process_definition(&previous.id)?;
            for subscription in stale {
                ctx.event_subscriptions()?.delete(&subscription.id)?;
            }
        }

        let expressions = ctx.services().expression_manager().clone();
        let mut start_subscriptions = Vec::new();
        for element in definition.start_events() {
            let subscription = match &element.event_definition {
                Some(EventDefinition::Signal(signal)) => {
                    determine_signal_name(signal, &definition, expressions.as_ref(), None)?.map(
                        |name| (SIGNAL_EVENT, name),
                    )
                }
                Some(EventDefinition::Message(message)) => {
                    determine_message_name(message, expressions.as_ref(), None)?
                        .map(|name| (MESSAGE_EVENT, name))
                }
                _ => None,
            };
            if let Some((event_type, name)) = subscription {
                start_subscriptions.push(EventSubscriptionEntity::for_definition(
                    event_type,
                    &name,
                    &definition.id,
                    &element.id,
                    definition.tenant_id.as_deref(),
                ));
            }
        }

        let count = start_subscriptions.len();
        let subscriptions = ctx.event_subscriptions()?;
        for subscription in start_subscriptions {
            subscriptions.insert(subscription);
        }
        ctx.add_close_listener(SaveDefinitionOnCommit {
            definition: definition.clone(),
        });

        info!(
            process_definition_id = %definition.id,
            start_subscriptions = count,
            "Deployed process definition"
        );
        Ok(definition.id.clone())
    }
}

/// Stores a deployed definition once its start subscriptions committed, so a
/// failed deployment leaves no definition behind.
struct SaveDefinitionOnCommit {
    definition: Arc<ProcessDefinition>,
}

impl CommandContextCloseListener for SaveDefinitionOnCommit {
    fn after_session_flushed(&mut self, ctx: &mut CommandContext) -> Result<()> {
        ctx.services()
            .stores()
            .definitions
            .save_definition(self.definition.clone())?;
        debug!(process_definition_id = %self.definition.id, "Stored process definition");
        Ok(())
    }
}

/// How [`StartProcessInstanceCmd`] finds its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessDefinitionReference {
    /// Latest version of a key.
    Key(String),
    /// Exact definition id.
    Id(String),
    /// Definition whose start event listens to a message name.
    Message(String),
}

/// Start a process instance. Returns the process instance id.
#[derive(Debug, Clone)]
pub struct StartProcessInstanceCmd {
    reference: ProcessDefinitionReference,
    tenant_id: Option<String>,
    variables: Map<String, Value>,
}

impl StartProcessInstanceCmd {
    /// Start the latest version of `key`.
    pub fn by_key(key: impl Into<String>) -> Self {
        Self::new(ProcessDefinitionReference::Key(key.into()))
    }

    /// Start a specific definition.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new(ProcessDefinitionReference::Id(id.into()))
    }

    /// Start the definition with a message start event named `message_name`.
    pub fn by_message(message_name: impl Into<String>) -> Self {
        Self::new(ProcessDefinitionReference::Message(message_name.into()))
    }

    fn new(reference: ProcessDefinitionReference) -> Self {
        Self {
            reference,
            tenant_id: None,
            variables: Map::new(),
        }
    }

    /// Restrict the lookup to a tenant.
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Initial variables of the instance.
    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Add one initial variable.
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    fn resolve(&self, ctx: &mut CommandContext) -> Result<(Arc<ProcessDefinition>, String)> {
        let tenant_id = self.tenant_id.as_deref();
        let not_found = |reference: &str| EngineError::ProcessDefinitionNotFound {
            reference: reference.to_string(),
        };

        let (definition, element_id) = match &self.reference {
            ProcessDefinitionReference::Key(key) => {
                let definition = ctx
                    .services()
                    .stores()
                    .definitions
                    .find_latest_definition_by_key(key, tenant_id)?
                    .ok_or_else(|| not_found(key))?;
                (definition, None)
            }
            ProcessDefinitionReference::Id(id) => (ctx.process_definition(id)?, None),
            ProcessDefinitionReference::Message(name) => {
                let subscription = ctx
                    .event_subscriptions()?
                    .find_by_name(MESSAGE_EVENT, name, tenant_id)?
                    .into_iter()
                    .find(EventSubscriptionEntity::is_start_subscription)
                    .ok_or_else(|| not_found(name))?;
                let definition_id = subscription.process_definition_id.unwrap_or_default();
                (ctx.process_definition(&definition_id)?, subscription.activity_id)
            }
        };

        if definition.suspended {
            return Err(EngineError::ProcessDefinitionSuspended {
                process_definition_id: definition.id.clone(),
            });
        }

        let element_id = match element_id {
            Some(element_id) => element_id,
            None => definition
                .initial_flow_element()
                .map(|element| element.id.clone())
                .ok_or_else(|| {
                    EngineError::IllegalArgument(format!(
                        "process definition '{}' has no initial flow element",
                        definition.id
                    ))
                })?,
        };
        Ok((definition, element_id))
    }
}

impl Command<String> for StartProcessInstanceCmd {
    fn execute(&self, ctx: &mut CommandContext) -> Result<String> {
        let (definition, element_id) = self.resolve(ctx)?;
        let tenant_id = self
            .tenant_id
            .as_deref()
            .or(definition.tenant_id.as_deref());

        let (process_instance_id, execution_id) = create_process_instance_at(
            ctx,
            &definition,
            &element_id,
            Some(&self.variables),
            tenant_id,
        )?;
        ctx.agenda_mut().plan_continue_process(execution_id);
        Ok(process_instance_id)
    }
}

/// Resume a waiting execution, optionally setting variables first.
#[derive(Debug, Clone)]
pub struct TriggerCmd {
    execution_id: String,
    variables: Option<Map<String, Value>>,
}

impl TriggerCmd {
    /// Trigger `execution_id`.
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            variables: None,
        }
    }

    /// Variables set on the execution before it is triggered.
    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }
}

impl Command<()> for TriggerCmd {
    fn execute(&self, ctx: &mut CommandContext) -> Result<()> {
        let execution = ctx.executions()?.get_mut(&self.execution_id)?;
        if let Some(variables) = &self.variables {
            execution.set_variables(variables);
        }
        ctx.agenda_mut()
            .plan_trigger_execution(self.execution_id.clone());
        Ok(())
    }
}
