use crate::graph::{GraphBuilder, ValidationReport, WorkflowGraph};
use crate::registry::{NodeDescription, NodeRegistry, Plugin};
use crate::{ExecutionResult, ExecutorConfig, WorkflowExecutor};
use gilcore::{EventBus, ExecutionEvent, FlowError, PortValues, WorkflowConfig, WorkflowError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Main runtime for executing workflows
pub struct GilRuntime {
    registry: Arc<NodeRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
}

impl GilRuntime {
    /// Create a new runtime with default settings and no node types
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()), config)
    }

    /// Create a runtime whose registry is assembled from plugins
    pub fn with_plugins(plugins: &[Plugin], config: RuntimeConfig) -> Self {
        let mut registry = NodeRegistry::new();
        let registered = registry.discover(plugins);
        tracing::debug!(registered, plugins = plugins.len(), "Node plugins loaded");
        Self::with_registry(Arc::new(registry), config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(config.executor));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor,
            event_bus,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn list_nodes(&self) -> Vec<String> {
        self.registry.list_available()
    }

    pub fn describe_node(&self, node_type: &str) -> Result<NodeDescription, WorkflowError> {
        self.registry.describe(node_type)
    }

    /// Structural and type checks without running anything
    pub fn validate(&self, workflow: &WorkflowConfig) -> ValidationReport {
        GraphBuilder::new(workflow).validate(Some(&self.registry))
    }

    pub fn graph(&self, workflow: &WorkflowConfig) -> Result<WorkflowGraph, WorkflowError> {
        GraphBuilder::new(workflow).build()
    }

    /// Execute a workflow with the given inputs
    pub async fn execute(
        &self,
        workflow: &WorkflowConfig,
        inputs: PortValues,
    ) -> Result<ExecutionResult, FlowError> {
        self.executor
            .execute(workflow, &self.registry, &self.event_bus, inputs)
            .await
    }

    pub async fn execute_with_cancellation(
        &self,
        workflow: &WorkflowConfig,
        inputs: PortValues,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, FlowError> {
        self.executor
            .execute_with_cancellation(workflow, &self.registry, &self.event_bus, inputs, cancel)
            .await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for GilRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_event_buffer() -> usize {
    1000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Abort on the first node failure instead of recording it and continuing
    pub fn strict(mut self) -> Self {
        self.executor.on_error = crate::ErrorHandling::StopWorkflow;
        self
    }

    pub fn with_node_timeout_ms(mut self, millis: u64) -> Self {
        self.executor.node_timeout_ms = Some(millis);
        self
    }
}
