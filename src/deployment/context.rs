use std::fmt;
use std::sync::Arc;

use super::in_process::{InProcessLock, StaticRoutes};
use super::interfaces::{
    DistributedLock, ExecutionSink, OrchestrationCatalog, RemoteCommandTransport, RouteResolver,
};
use crate::commands::{CompletionRegistry, RemoteDispatcher};
use crate::config::FleetConfig;
use crate::events::EventPublisher;
use crate::models::Server;
use crate::operations::OperationRegistry;
use crate::scheduler::AsyncOperator;

/// Everything a deployment needs from the hosting process
///
/// Passed explicitly into assembly and every command constructor; cloning is
/// cheap and shares the scheduler, registries and collaborators.
#[derive(Clone)]
pub struct RuntimeContext {
    server: Server,
    config: Arc<FleetConfig>,
    operator: AsyncOperator,
    registry: Arc<OperationRegistry>,
    lock: Arc<dyn DistributedLock>,
    transport: Option<Arc<dyn RemoteCommandTransport>>,
    routes: Arc<dyn RouteResolver>,
    completions: CompletionRegistry,
    sink: Option<Arc<dyn ExecutionSink>>,
    catalog: Option<Arc<dyn OrchestrationCatalog>>,
    events: EventPublisher,
}

impl RuntimeContext {
    pub fn builder(server: Server) -> RuntimeContextBuilder {
        RuntimeContextBuilder::new(server)
    }

    /// The server this process runs as
    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn operator(&self) -> &AsyncOperator {
        &self.operator
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn lock(&self) -> &Arc<dyn DistributedLock> {
        &self.lock
    }

    pub fn routes(&self) -> &Arc<dyn RouteResolver> {
        &self.routes
    }

    /// Inbound completion hook for proxied commands
    pub fn completions(&self) -> &CompletionRegistry {
        &self.completions
    }

    pub fn sink(&self) -> Option<&Arc<dyn ExecutionSink>> {
        self.sink.as_ref()
    }

    pub fn catalog(&self) -> Option<&Arc<dyn OrchestrationCatalog>> {
        self.catalog.as_ref()
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Dispatcher for proxied commands; `None` without a transport
    pub fn dispatcher(&self) -> Option<RemoteDispatcher> {
        self.transport.as_ref().map(|transport| {
            RemoteDispatcher::new(
                Arc::clone(transport),
                Arc::clone(&self.routes),
                self.completions.clone(),
                self.server.id,
                self.config.execution.proxy_timeout(),
            )
        })
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("server", &self.server)
            .field("operator", &self.operator)
            .field("registry", &self.registry)
            .field("remote", &self.transport.is_some())
            .field("sink", &self.sink.is_some())
            .field("catalog", &self.catalog.is_some())
            .finish()
    }
}

pub struct RuntimeContextBuilder {
    server: Server,
    config: FleetConfig,
    operator: Option<AsyncOperator>,
    registry: Option<OperationRegistry>,
    lock: Option<Arc<dyn DistributedLock>>,
    transport: Option<Arc<dyn RemoteCommandTransport>>,
    routes: Option<Arc<dyn RouteResolver>>,
    completions: Option<CompletionRegistry>,
    sink: Option<Arc<dyn ExecutionSink>>,
    catalog: Option<Arc<dyn OrchestrationCatalog>>,
    events: Option<EventPublisher>,
}

impl RuntimeContextBuilder {
    fn new(server: Server) -> Self {
        Self {
            server,
            config: FleetConfig::default(),
            operator: None,
            registry: None,
            lock: None,
            transport: None,
            routes: None,
            completions: None,
            sink: None,
            catalog: None,
            events: None,
        }
    }

    pub fn with_config(mut self, config: FleetConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a scheduler instead of creating one from the config
    pub fn with_operator(mut self, operator: AsyncOperator) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_lock(mut self, lock: Arc<dyn DistributedLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn RemoteCommandTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_routes(mut self, routes: Arc<dyn RouteResolver>) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn with_completions(mut self, completions: CompletionRegistry) -> Self {
        self.completions = Some(completions);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn OrchestrationCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> RuntimeContext {
        let operator = self
            .operator
            .unwrap_or_else(|| AsyncOperator::from_config(&self.config.scheduler));
        let events = self
            .events
            .unwrap_or_else(|| EventPublisher::new(self.config.events.channel_capacity));

        RuntimeContext {
            server: self.server,
            operator,
            registry: Arc::new(self.registry.unwrap_or_default()),
            lock: self
                .lock
                .unwrap_or_else(|| Arc::new(InProcessLock::new())),
            transport: self.transport,
            routes: self
                .routes
                .unwrap_or_else(|| Arc::new(StaticRoutes::new())),
            completions: self.completions.unwrap_or_default(),
            sink: self.sink,
            catalog: self.catalog,
            events,
            config: Arc::new(self.config),
        }
    }
}
