use crate::{NodeContext, NodeError, Port, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub type NodeId = String;

/// Named values keyed by port name.
pub type PortValues = HashMap<String, Value>;

/// Core trait that all executable nodes implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Identity, type and port layout of this instance.
    fn descriptor(&self) -> &NodeDescriptor;

    /// Run the node. Only called after [`Node::validate_inputs`] succeeded.
    async fn execute(&self, inputs: PortValues, ctx: &NodeContext) -> Result<NodeOutput, NodeError>;

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Unique type identifier (e.g. "util.log_message")
    fn node_type(&self) -> &str {
        &self.descriptor().node_type
    }

    fn input_ports(&self) -> &[Port] {
        &self.descriptor().input_ports
    }

    fn output_ports(&self) -> &[Port] {
        &self.descriptor().output_ports
    }

    fn input_port(&self, name: &str) -> Option<&Port> {
        self.input_ports().iter().find(|p| p.name == name)
    }

    fn output_port(&self, name: &str) -> Option<&Port> {
        self.output_ports().iter().find(|p| p.name == name)
    }

    /// Fill declared defaults for absent inputs, then fail on any required
    /// port that is still unmet or any value its port does not accept.
    fn validate_inputs(&self, inputs: &mut PortValues) -> Result<(), NodeError> {
        for port in self.input_ports() {
            let absent = inputs.get(&port.name).map_or(true, Value::is_null);
            if absent {
                if let Some(default) = &port.default_value {
                    inputs.insert(port.name.clone(), default.clone());
                }
            }
            if !port.validate(inputs.get(&port.name)) {
                return Err(match inputs.get(&port.name) {
                    Some(value) if !value.is_null() => NodeError::InvalidInput {
                        port: port.name.clone(),
                        reason: format!("expected {}, got {}", port.data_kind, value.type_name()),
                    },
                    _ => NodeError::missing_input(port.name.as_str()),
                });
            }
        }
        Ok(())
    }
}

/// Static description of a node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub name: String,
    pub node_type: String,
    pub version: String,
    pub config: HashMap<String, Value>,
    pub input_ports: Vec<Port>,
    pub output_ports: Vec<Port>,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            version: "1.0.0".to_string(),
            config: HashMap::new(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_config(mut self, config: HashMap<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_input(mut self, port: Port) -> Self {
        self.input_ports.push(port);
        self
    }

    pub fn with_output(mut self, port: Port) -> Self {
        self.output_ports.push(port);
        self
    }
}

/// Output from node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Output port values
    pub outputs: PortValues,

    /// Execution metadata
    pub metadata: NodeMetadata,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            metadata: NodeMetadata::default(),
        }
    }

    pub fn from_outputs(outputs: PortValues) -> Self {
        Self {
            outputs,
            metadata: NodeMetadata::default(),
        }
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(port.into(), value.into());
        self
    }
}

impl Default for NodeOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata about node execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub execution_time_ms: u64,
}

/// Mutable run bookkeeping for one node instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRunState {
    pub is_running: bool,
    /// Seconds since the Unix epoch at the end of the last invocation.
    pub last_execution: Option<f64>,
    pub execution_count: u64,
}

/// A constructed node plus its run state. The executor drives nodes
/// through [`NodeInstance::run`], never through `execute` directly.
pub struct NodeInstance {
    node: Box<dyn Node>,
    state: Mutex<NodeRunState>,
}

impl NodeInstance {
    pub fn new(node: Box<dyn Node>) -> Self {
        Self {
            node,
            state: Mutex::new(NodeRunState::default()),
        }
    }

    pub fn node(&self) -> &dyn Node {
        self.node.as_ref()
    }

    pub fn id(&self) -> &str {
        self.node.id()
    }

    pub fn run_state(&self) -> NodeRunState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Validate, then execute with the running flag held for the duration
    /// of the call. The flag is cleared even when execution fails.
    pub async fn run(&self, mut inputs: PortValues, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        self.node.validate_inputs(&mut inputs)?;

        let _running = RunGuard::acquire(&self.state);
        let start = Instant::now();
        let mut output = self.node.execute(inputs, ctx).await?;
        output.metadata.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(output)
    }
}

impl From<Box<dyn Node>> for NodeInstance {
    fn from(node: Box<dyn Node>) -> Self {
        Self::new(node)
    }
}

struct RunGuard<'a> {
    state: &'a Mutex<NodeRunState>,
}

impl<'a> RunGuard<'a> {
    fn acquire(state: &'a Mutex<NodeRunState>) -> Self {
        state.lock().unwrap_or_else(PoisonError::into_inner).is_running = true;
        Self { state }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.is_running = false;
        state.execution_count += 1;
        state.last_execution = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataKind, WorkflowContext};

    struct Echo {
        descriptor: NodeDescriptor,
        fail: bool,
    }

    impl Echo {
        fn new(fail: bool) -> Self {
            Self {
                descriptor: NodeDescriptor::new("echo", "test.echo")
                    .with_input(Port::input("input", DataKind::Any))
                    .with_input(Port::input("times", DataKind::Number).with_default(1i64))
                    .with_input(Port::input("label", DataKind::Text).optional())
                    .with_output(Port::output("output", DataKind::Any)),
                fail,
            }
        }
    }

    #[async_trait]
    impl Node for Echo {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.descriptor
        }

        async fn execute(&self, inputs: PortValues, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
            if self.fail {
                return Err(NodeError::execution(self.id(), "echo refused"));
            }
            Ok(NodeOutput::from_outputs(inputs))
        }
    }

    fn ctx() -> NodeContext {
        NodeContext::standalone("echo", WorkflowContext::new("wf"))
    }

    #[test]
    fn defaults_fill_missing_inputs() {
        let node = Echo::new(false);
        let mut inputs = PortValues::new();
        inputs.insert("input".into(), Value::from("hi"));
        node.validate_inputs(&mut inputs).unwrap();
        assert_eq!(inputs.get("times"), Some(&Value::from(1i64)));
        assert!(!inputs.contains_key("label"));
    }

    #[test]
    fn missing_required_input_is_invalid() {
        let node = Echo::new(false);
        let err = node.validate_inputs(&mut PortValues::new()).unwrap_err();
        assert_eq!(err, NodeError::missing_input("input"));
    }

    #[test]
    fn wrong_kind_is_invalid() {
        let node = Echo::new(false);
        let mut inputs = PortValues::new();
        inputs.insert("input".into(), Value::Null);
        inputs.insert("times".into(), Value::from("three"));
        // `input` is checked first and is absent.
        assert_eq!(
            node.validate_inputs(&mut inputs).unwrap_err(),
            NodeError::missing_input("input")
        );
        inputs.insert("input".into(), Value::from(1.0));
        assert!(matches!(
            node.validate_inputs(&mut inputs),
            Err(NodeError::InvalidInput { port, .. }) if port == "times"
        ));
    }

    #[tokio::test]
    async fn run_tracks_state_on_success_and_failure() {
        let ok = NodeInstance::new(Box::new(Echo::new(false)));
        let mut inputs = PortValues::new();
        inputs.insert("input".into(), Value::from("x"));
        let out = ok.run(inputs, &ctx()).await.unwrap();
        assert_eq!(out.outputs.get("input"), Some(&Value::from("x")));
        let state = ok.run_state();
        assert!(!state.is_running);
        assert_eq!(state.execution_count, 1);
        assert!(state.last_execution.is_some());

        let failing = NodeInstance::new(Box::new(Echo::new(true)));
        let mut inputs = PortValues::new();
        inputs.insert("input".into(), Value::from("x"));
        assert!(failing.run(inputs, &ctx()).await.is_err());
        assert!(!failing.run_state().is_running);
        assert_eq!(failing.run_state().execution_count, 1);
    }

    #[tokio::test]
    async fn invalid_inputs_never_reach_execute() {
        let node = NodeInstance::new(Box::new(Echo::new(false)));
        let err = node.run(PortValues::new(), &ctx()).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(node.run_state().execution_count, 0);
    }
}
