use crate::graph::GraphBuilder;
use crate::registry::NodeRegistry;
use chrono::Utc;
use gilcore::{
    ContextManager, ContextSnapshot, EventBus, ExecutionEvent, ExecutionId, FlowError,
    NodeContext, NodeError, NodeInstance, NodeOutput, PortValues, ReferenceResolver, Value,
    WorkflowConfig, WorkflowError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// What the executor does when a node fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Record the failure and keep running the remaining nodes
    #[default]
    ContinueOnError,
    /// Abort the run on the first failure
    StopWorkflow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub on_error: ErrorHandling,
    /// Per-node limit; an expired node is recorded as a timeout failure.
    #[serde(default)]
    pub node_timeout_ms: Option<u64>,
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    Ordering,
    Running,
    Completed,
    Failed,
}

fn enter(execution_id: ExecutionId, phase: RunPhase) {
    tracing::debug!(%execution_id, ?phase, "Run phase");
}

/// Runs one workflow at a time, nodes strictly in topological order
pub struct WorkflowExecutor {
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a workflow and return results
    pub async fn execute(
        &self,
        workflow: &WorkflowConfig,
        registry: &NodeRegistry,
        event_bus: &EventBus,
        inputs: PortValues,
    ) -> Result<ExecutionResult, FlowError> {
        self.execute_with_cancellation(workflow, registry, event_bus, inputs, CancellationToken::new())
            .await
    }

    /// Like [`WorkflowExecutor::execute`]; once `cancel` fires, the running
    /// node and every node after it are recorded as cancelled.
    pub async fn execute_with_cancellation(
        &self,
        workflow: &WorkflowConfig,
        registry: &NodeRegistry,
        event_bus: &EventBus,
        inputs: PortValues,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        tracing::info!(workflow = %workflow.name, %execution_id, "Starting workflow execution");

        let (order, nodes) = match self.prepare(workflow, registry, &inputs, execution_id) {
            Ok(prepared) => prepared,
            Err(e) => {
                enter(execution_id, RunPhase::Failed);
                tracing::error!(workflow = %workflow.name, error = %e, "Workflow could not start");
                return Err(e);
            }
        };

        enter(execution_id, RunPhase::Running);
        let mut manager = ContextManager::new(workflow.name.clone());
        let flow = manager.flow_context().clone();
        flow.update_metadata("execution_id", execution_id.to_string()).await;
        flow.set_total_nodes(order.len()).await;

        event_bus.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow: workflow.name.clone(),
            execution_order: order.clone(),
            timestamp: Utc::now(),
        });

        let declared: Vec<&str> = workflow.node_ids().collect();
        let mut node_outputs: HashMap<String, PortValues> = HashMap::new();
        let mut failed_nodes = 0;

        for node_id in &order {
            let (Some(instance), Some(spec)) = (nodes.get(node_id), workflow.node(node_id)) else {
                return Err(WorkflowError::NodeNotFound(node_id.clone()).into());
            };

            let ctx = manager.create_node_context(node_id, event_bus.create_emitter(execution_id, node_id));
            let view = manager.view(Some(node_id)).await;

            let mut node_inputs: PortValues = inputs
                .get(node_id)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let resolver = ReferenceResolver::new()
                .with_inputs(&inputs)
                .with_environment(&workflow.environment)
                .with_results(&node_outputs)
                .with_declared(declared.iter().copied())
                .with_context(&view);
            node_inputs.extend(resolver.resolve_map(&spec.inputs));

            event_bus.emit(ExecutionEvent::NodeStarted {
                execution_id,
                node_id: node_id.clone(),
                node_type: spec.node_type.clone(),
                timestamp: Utc::now(),
            });
            tracing::debug!(node_id = %node_id, node_type = %spec.node_type, "Executing node");

            let started = Instant::now();
            let outcome = self.run_node(instance, node_inputs, &ctx, &cancel).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    tracing::info!(node_id = %node_id, duration_ms, "Node completed");

                    event_bus.emit(ExecutionEvent::NodeCompleted {
                        execution_id,
                        node_id: node_id.clone(),
                        outputs: output.outputs.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });

                    node_outputs.insert(node_id.clone(), output.outputs);
                    flow.increment_completed_nodes().await;
                }
                Err(e) => {
                    tracing::error!(node_id = %node_id, kind = e.kind(), error = %e, "Node failed");

                    ctx.record_error(&e).await;
                    event_bus.emit(ExecutionEvent::NodeFailed {
                        execution_id,
                        node_id: node_id.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });

                    node_outputs.insert(node_id.clone(), error_output(&e));
                    failed_nodes += 1;

                    if self.config.on_error == ErrorHandling::StopWorkflow {
                        enter(execution_id, RunPhase::Failed);
                        event_bus.emit(ExecutionEvent::WorkflowCompleted {
                            execution_id,
                            failed_nodes,
                            duration_ms: start_time.elapsed().as_millis() as u64,
                            timestamp: Utc::now(),
                        });
                        return Err(FlowError::Execution(format!("Node '{}' failed: {}", node_id, e)));
                    }
                }
            }
        }

        let view = manager.view(None).await;
        let outputs = ReferenceResolver::new()
            .with_inputs(&inputs)
            .with_environment(&workflow.environment)
            .with_results(&node_outputs)
            .with_declared(declared.iter().copied())
            .with_context(&view)
            .resolve_map(&workflow.outputs);

        enter(execution_id, RunPhase::Completed);
        let duration_ms = start_time.elapsed().as_millis() as u64;
        event_bus.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            failed_nodes,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(workflow = %workflow.name, duration_ms, failed_nodes, "Workflow finished");

        Ok(ExecutionResult {
            execution_id,
            node_outputs,
            context: view.flow,
            outputs,
        })
    }

    /// Build the graph, construct every node and compute the order.
    /// Anything failing here is fatal: no node has run yet.
    fn prepare(
        &self,
        workflow: &WorkflowConfig,
        registry: &NodeRegistry,
        inputs: &PortValues,
        execution_id: ExecutionId,
    ) -> Result<(Vec<String>, HashMap<String, NodeInstance>), FlowError> {
        enter(execution_id, RunPhase::Initializing);
        let graph = GraphBuilder::new(workflow).build()?;

        let resolver = ReferenceResolver::new()
            .with_inputs(inputs)
            .with_environment(&workflow.environment);
        let mut nodes = HashMap::with_capacity(workflow.nodes.len());
        for (id, spec) in workflow.nodes.iter() {
            let config = resolver.resolve_map(&spec.config);
            let node = registry.create(&spec.node_type, id, &config)?;
            nodes.insert(id.to_string(), NodeInstance::new(node));
        }

        enter(execution_id, RunPhase::Ordering);
        let order = graph.execution_order()?;
        tracing::debug!(order = ?order, "Execution order");
        Ok((order, nodes))
    }

    async fn run_node(
        &self,
        instance: &NodeInstance,
        inputs: PortValues,
        ctx: &NodeContext,
        cancel: &CancellationToken,
    ) -> Result<NodeOutput, NodeError> {
        if cancel.is_cancelled() {
            return Err(NodeError::Cancelled);
        }

        let bounded = async {
            match self.config.node_timeout_ms {
                Some(millis) => timeout(Duration::from_millis(millis), instance.run(inputs, ctx))
                    .await
                    .unwrap_or_else(|_| Err(NodeError::Timeout { millis })),
                None => instance.run(inputs, ctx).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NodeError::Cancelled),
            result = bounded => result,
        }
    }
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

fn error_output(error: &NodeError) -> PortValues {
    let mut output = PortValues::new();
    output.insert("error".to_string(), Value::from(error.to_string()));
    output
}

/// Result of workflow execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    #[serde(skip)]
    pub execution_id: ExecutionId,
    /// Output mapping per node, or `{"error": message}` for failed nodes
    pub node_outputs: HashMap<String, PortValues>,
    /// Workflow context as it stood when the run finished
    pub context: ContextSnapshot,
    /// Resolved `outputs` section of the workflow
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub outputs: HashMap<String, Value>,
}

impl ExecutionResult {
    /// Ids of nodes with at least one recorded error, in the order they failed.
    pub fn failed_nodes(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = Vec::new();
        for record in &self.context.errors {
            if !failed.contains(&record.node_id.as_str()) {
                failed.push(record.node_id.as_str());
            }
        }
        failed
    }

    pub fn is_success(&self) -> bool {
        self.context.errors.is_empty()
    }

    pub fn to_json(&self) -> Result<serde_json::Value, FlowError> {
        Ok(serde_json::to_value(self)?)
    }
}
