// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine assembly.
//!
//! [`Engine::builder`] wires persistence, the session factories, event
//! handlers and the async task executor into [`EngineServices`], builds the
//! interceptor chain and starts the executor.
//!
//! # Example
//!
//! ```rust,ignore
//! use runtara_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::builder()
//!     .config(EngineConfig::from_env()?)
//!     .build()?;
//!
//! engine.deploy(definition)?;
//! let instance_id = engine.start_process_instance_by_key("order")?;
//!
//! engine.shutdown();
//! ```

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};

use crate::command::interceptor::{
    CommandContextInterceptor, LogInterceptor, TransactionContextInterceptor,
};
use crate::command::{
    Command, CommandConfig, CommandExecutor, CommandInterceptor, CommandInterceptorChainBuilder,
    CommandInvoker, SessionFactories, SessionFactory, StandaloneTransactionContextFactory,
    TransactionContextFactory,
};
use crate::commands::{
    DeployProcessDefinitionCmd, MessageEventReceivedCmd, SignalEventReceivedCmd,
    StartProcessInstanceCmd, TriggerCmd,
};
use crate::config::EngineConfig;
use crate::entity::{EventSubscriptionEntity, ExecutionEntity};
use crate::error::{EngineError, Result};
use crate::event::{EngineEventDispatcher, EngineEventListener, EventHandler, EventHandlerRegistry};
use crate::executor::{AsyncTaskExecutor, AsyncTaskInvoker, DefaultAsyncTaskExecutor};
use crate::expression::{DefaultExpressionManager, ExpressionManager};
use crate::model::ProcessDefinition;
use crate::persistence::session::{
    EventSubscriptionEntityManagerFactory, ExecutionEntityManagerFactory,
};
use crate::persistence::{InMemoryPersistence, PersistenceStores};

/// Engine-wide services shared by every command context.
pub struct EngineServices {
    config: EngineConfig,
    pub(crate) session_factories: SessionFactories,
    stores: PersistenceStores,
    event_handlers: EventHandlerRegistry,
    expression_manager: Arc<dyn ExpressionManager>,
    event_dispatcher: Arc<EngineEventDispatcher>,
    async_task_invoker: AsyncTaskInvoker,
}

impl fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineServices")
            .field("config", &self.config)
            .field("session_factories", &self.session_factories.len())
            .field("event_handlers", &self.event_handlers)
            .field("event_dispatcher", &self.event_dispatcher)
            .field("async_task_invoker", &self.async_task_invoker)
            .finish_non_exhaustive()
    }
}

impl EngineServices {
    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Backing stores.
    pub fn stores(&self) -> &PersistenceStores {
        &self.stores
    }

    /// Event handlers by event type.
    pub fn event_handlers(&self) -> &EventHandlerRegistry {
        &self.event_handlers
    }

    /// Expression evaluation for event names.
    pub fn expression_manager(&self) -> &Arc<dyn ExpressionManager> {
        &self.expression_manager
    }

    /// Engine event fan-out.
    pub fn event_dispatcher(&self) -> &Arc<EngineEventDispatcher> {
        &self.event_dispatcher
    }

    /// Background submission with caller-thread fallback.
    pub fn async_task_invoker(&self) -> &AsyncTaskInvoker {
        &self.async_task_invoker
    }
}

/// Builder for an [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    stores: Option<PersistenceStores>,
    expression_manager: Option<Arc<dyn ExpressionManager>>,
    event_handlers: Vec<Arc<dyn EventHandler>>,
    transaction_factory: Option<Arc<dyn TransactionContextFactory>>,
    async_task_executor: Option<Arc<dyn AsyncTaskExecutor>>,
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
    session_factories: Vec<Arc<dyn SessionFactory>>,
    listeners: Vec<Arc<dyn EngineEventListener>>,
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("stores", &self.stores.as_ref().map(|_| "..."))
            .field("event_handlers", &self.event_handlers.len())
            .field("interceptors", &self.interceptors.len())
            .field("session_factories", &self.session_factories.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    /// Create a builder with default settings and in-memory persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use the given stores instead of a fresh in-memory backend.
    pub fn persistence(mut self, stores: PersistenceStores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Replace the expression manager.
    pub fn expression_manager(mut self, manager: Arc<dyn ExpressionManager>) -> Self {
        self.expression_manager = Some(manager);
        self
    }

    /// Register an event handler, replacing a built-in one of the same type.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Replace the transaction factory.
    ///
    /// Default: [`StandaloneTransactionContextFactory`]
    pub fn transaction_factory(mut self, factory: Arc<dyn TransactionContextFactory>) -> Self {
        self.transaction_factory = Some(factory);
        self
    }

    /// Replace the async task executor. It is started by [`build`](Self::build).
    pub fn async_task_executor(mut self, executor: Arc<dyn AsyncTaskExecutor>) -> Self {
        self.async_task_executor = Some(executor);
        self
    }

    /// Add an interceptor running before a context is installed.
    pub fn interceptor(mut self, interceptor: Arc<dyn CommandInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Register an additional session factory, replacing one of the same
    /// session type.
    pub fn session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.session_factories.push(factory);
        self
    }

    /// Add an engine event listener.
    pub fn event_listener(mut self, listener: Arc<dyn EngineEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Validate the configuration, wire the services and start the executor.
    pub fn build(self) -> Result<Engine> {
        self.config
            .executor
            .validate()
            .map_err(|e| EngineError::IllegalArgument(e.to_string()))?;

        let stores = self
            .stores
            .unwrap_or_else(|| PersistenceStores::in_memory(Arc::new(InMemoryPersistence::new())));

        let mut session_factories: SessionFactories = SessionFactories::new();
        let defaults: [Arc<dyn SessionFactory>; 2] = [
            Arc::new(ExecutionEntityManagerFactory::new(stores.executions.clone())),
            Arc::new(EventSubscriptionEntityManagerFactory::new(
                stores.event_subscriptions.clone(),
            )),
        ];
        for factory in defaults.into_iter().chain(self.session_factories) {
            let session_type: TypeId = factory.session_type();
            session_factories.insert(session_type, factory);
        }

        let mut event_handlers = EventHandlerRegistry::with_defaults();
        for handler in self.event_handlers {
            event_handlers.register(handler);
        }

        let event_dispatcher = Arc::new(EngineEventDispatcher::new(
            self.config.event_dispatcher_enabled,
        ));
        for listener in self.listeners {
            event_dispatcher.add_listener(listener);
        }

        let async_task_executor = self.async_task_executor.unwrap_or_else(|| {
            Arc::new(DefaultAsyncTaskExecutor::new(self.config.executor.clone()))
        });
        async_task_executor.start();

        let services = Arc::new(EngineServices {
            config: self.config,
            session_factories,
            stores,
            event_handlers,
            expression_manager: self
                .expression_manager
                .unwrap_or_else(|| Arc::new(DefaultExpressionManager)),
            event_dispatcher,
            async_task_invoker: AsyncTaskInvoker::new(async_task_executor.clone()),
        });

        let transaction_factory = self
            .transaction_factory
            .unwrap_or_else(|| Arc::new(StandaloneTransactionContextFactory));

        let mut chain = CommandInterceptorChainBuilder::new().interceptor(LogInterceptor);
        for interceptor in self.interceptors {
            chain = chain.shared_interceptor(interceptor);
        }
        let command_executor = chain
            .interceptor(CommandContextInterceptor::new(services.clone()))
            .interceptor(TransactionContextInterceptor::new(transaction_factory))
            .build(CommandInvoker);

        info!(
            core_pool_size = services.config.executor.core_pool_size,
            max_pool_size = services.config.executor.max_pool_size,
            event_dispatcher_enabled = services.config.event_dispatcher_enabled,
            "Engine built"
        );

        Ok(Engine {
            services,
            command_executor,
            async_task_executor,
        })
    }
}

/// A running engine.
///
/// Call [`shutdown`](Self::shutdown) to stop the async task executor.
pub struct Engine {
    services: Arc<EngineServices>,
    command_executor: CommandExecutor,
    async_task_executor: Arc<dyn AsyncTaskExecutor>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("services", &self.services)
            .field("command_executor", &self.command_executor)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create a new builder for configuring the engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Shared services.
    pub fn services(&self) -> &Arc<EngineServices> {
        &self.services
    }

    /// The interceptor chain entry point.
    pub fn command_executor(&self) -> &CommandExecutor {
        &self.command_executor
    }

    /// Run a command with the default config.
    pub fn execute<T: 'static>(&self, command: impl Command<T>) -> Result<T> {
        self.command_executor.execute_default(command)
    }

    /// Run a command with an explicit config.
    pub fn execute_with<T: 'static>(
        &self,
        config: CommandConfig,
        command: impl Command<T>,
    ) -> Result<T> {
        self.command_executor.execute(config, command)
    }

    /// Deploy a definition. Returns its id.
    #[instrument(skip_all, fields(key = %definition.key, version = definition.version))]
    pub fn deploy(&self, definition: ProcessDefinition) -> Result<String> {
        self.execute(DeployProcessDefinitionCmd::new(definition))
    }

    /// Start the latest version of `key`. Returns the process instance id.
    #[instrument(skip(self))]
    pub fn start_process_instance_by_key(&self, key: &str) -> Result<String> {
        self.execute(StartProcessInstanceCmd::by_key(key))
    }

    /// Start an instance through an arbitrary [`StartProcessInstanceCmd`].
    pub fn start_process_instance(&self, command: StartProcessInstanceCmd) -> Result<String> {
        self.execute(command)
    }

    /// Broadcast a signal, handling each subscription in this call.
    /// Returns the number of subscriptions reached.
    #[instrument(skip(self, payload))]
    pub fn signal_event_received(&self, signal_name: &str, payload: Option<Value>) -> Result<usize> {
        let mut command = SignalEventReceivedCmd::new(signal_name);
        if let Some(payload) = payload {
            command = command.payload(payload);
        }
        self.execute(command)
    }

    /// Broadcast a signal, handling each subscription in its own context on
    /// the async task executor once this call's context closed.
    #[instrument(skip(self, payload))]
    pub fn signal_event_received_async(
        &self,
        signal_name: &str,
        payload: Option<Value>,
    ) -> Result<usize> {
        let mut command = SignalEventReceivedCmd::new(signal_name).asynchronous();
        if let Some(payload) = payload {
            command = command.payload(payload);
        }
        self.execute(command)
    }

    /// Deliver a message to an execution waiting for it.
    #[instrument(skip(self, payload))]
    pub fn message_event_received(
        &self,
        message_name: &str,
        execution_id: &str,
        payload: Option<Value>,
    ) -> Result<()> {
        let mut command = MessageEventReceivedCmd::new(message_name, execution_id);
        if let Some(payload) = payload {
            command = command.payload(payload);
        }
        self.execute(command)
    }

    /// Resume a waiting execution.
    #[instrument(skip(self))]
    pub fn trigger(&self, execution_id: &str) -> Result<()> {
        self.execute(TriggerCmd::new(execution_id))
    }

    /// Read an execution from the store.
    pub fn find_execution(&self, execution_id: &str) -> Result<Option<ExecutionEntity>> {
        self.services.stores.executions.find_execution(execution_id)
    }

    /// All executions of a process instance, including the instance itself.
    pub fn find_executions_by_process_instance(
        &self,
        process_instance_id: &str,
    ) -> Result<Vec<ExecutionEntity>> {
        self.services
            .stores
            .executions
            .find_executions_by_process_instance(process_instance_id)
    }

    /// Subscriptions held by an execution, optionally of one type.
    pub fn find_event_subscriptions(
        &self,
        execution_id: &str,
        event_type: Option<&str>,
    ) -> Result<Vec<EventSubscriptionEntity>> {
        self.services
            .stores
            .event_subscriptions
            .find_subscriptions_by_execution(execution_id, event_type)
    }

    /// Engine event fan-out.
    pub fn event_dispatcher(&self) -> &Arc<EngineEventDispatcher> {
        &self.services.event_dispatcher
    }

    /// Background submission with caller-thread fallback.
    pub fn async_task_invoker(&self) -> &AsyncTaskInvoker {
        &self.services.async_task_invoker
    }

    /// Stop the async task executor, waiting for queued tasks up to the
    /// configured grace period.
    pub fn shutdown(&self) {
        info!("Engine shutting down...");
        self.async_task_executor.shutdown();
        info!("Engine shutdown complete");
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.async_task_executor.is_shutdown()
    }
}
