use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failures scoped to a single node. These never abort a run on their own;
/// the executor records them and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Invalid input '{port}': {reason}")]
    InvalidInput { port: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed in node '{node_id}': {message}")]
    ExecutionFailed { node_id: String, message: String },

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn missing_input(port: impl Into<String>) -> Self {
        NodeError::InvalidInput {
            port: port.into(),
            reason: "required input is missing".to_string(),
        }
    }

    pub fn execution(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        NodeError::ExecutionFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Stable tag stored in `ErrorRecord::kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::InvalidInput { .. } => "invalid_input",
            NodeError::Configuration(_) => "configuration",
            NodeError::ExecutionFailed { .. } => "execution",
            NodeError::Timeout { .. } => "timeout",
            NodeError::Cancelled => "cancelled",
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Cyclic dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Failed to construct node '{node}': {source}")]
    Construction {
        node: String,
        #[source]
        source: NodeError,
    },

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
}
