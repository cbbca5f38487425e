use gilcore::{Node, NodeError, Port, Value, WorkflowError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a new instance of the node with given id and configuration
    fn create(&self, id: &str, config: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Optional: description and category shown by `describe`
    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata::default()
    }
}

/// Static information about a node type
#[derive(Debug, Clone, Serialize)]
pub struct NodeTypeMetadata {
    pub description: String,
    pub category: String,
}

impl Default for NodeTypeMetadata {
    fn default() -> Self {
        Self {
            description: "No description provided.".to_string(),
            category: "general".to_string(),
        }
    }
}

impl NodeTypeMetadata {
    pub fn new(description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
        }
    }
}

type Constructor =
    dyn Fn(&str, &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> + Send + Sync;

/// Adapts a plain constructor function into a [`NodeFactory`].
pub struct FnFactory {
    node_type: String,
    metadata: NodeTypeMetadata,
    constructor: Box<Constructor>,
}

impl FnFactory {
    pub fn new<F>(node_type: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&str, &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> + Send + Sync + 'static,
    {
        Self {
            node_type: node_type.into(),
            metadata: NodeTypeMetadata::default(),
            constructor: Box::new(constructor),
        }
    }

    pub fn with_metadata(mut self, metadata: NodeTypeMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl NodeFactory for FnFactory {
    fn create(&self, id: &str, config: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        (self.constructor)(id, config)
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn metadata(&self) -> NodeTypeMetadata {
        self.metadata.clone()
    }
}

/// Loader result: the `(type name, factory)` pairs a plugin contributes.
pub type PluginEntries = Vec<(String, Arc<dyn NodeFactory>)>;

type Loader = dyn Fn() -> Result<PluginEntries, String> + Send + Sync;

/// A named bundle of node types assembled by the host program.
pub struct Plugin {
    pub name: String,
    loader: Box<Loader>,
}

impl Plugin {
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<PluginEntries, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            loader: Box::new(loader),
        }
    }

    pub fn load(&self) -> Result<PluginEntries, String> {
        (self.loader)()
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name).finish()
    }
}

/// Result of introspecting a registered node type.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDescription {
    #[serde(rename = "type")]
    pub node_type: String,
    pub description: String,
    pub category: String,
    pub input_ports: Vec<Port>,
    pub output_ports: Vec<Port>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports_error: Option<String>,
}

/// Registry of available node types
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory under its own type name
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        self.register_as(node_type, factory);
    }

    /// Register a factory under an explicit name. Last registration wins.
    pub fn register_as(&mut self, node_type: impl Into<String>, factory: Arc<dyn NodeFactory>) {
        let node_type = node_type.into();
        if self.factories.contains_key(&node_type) {
            tracing::warn!(node_type = %node_type, "Node type already registered, overwriting");
        } else {
            tracing::debug!(node_type = %node_type, "Registering node type");
        }
        self.factories.insert(node_type, factory);
    }

    /// Register everything the given plugins provide. A plugin that fails to
    /// load is skipped.
    pub fn discover(&mut self, plugins: &[Plugin]) -> usize {
        let mut registered = 0;
        for plugin in plugins {
            match plugin.load() {
                Ok(entries) => {
                    for (node_type, factory) in entries {
                        self.register_as(node_type, factory);
                        registered += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(plugin = %plugin.name, error = %e, "Could not load node plugin");
                }
            }
        }
        registered
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Create a node instance from a node type, id and config
    pub fn create(
        &self,
        node_type: &str,
        id: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Node>, WorkflowError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;

        factory
            .create(id, config)
            .map_err(|source| WorkflowError::Construction {
                node: id.to_string(),
                source,
            })
    }

    /// Get all registered node types, sorted
    pub fn list_available(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Describe a node type by building a throwaway instance with an empty config.
    pub fn describe(&self, node_type: &str) -> Result<NodeDescription, WorkflowError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;
        let metadata = factory.metadata();

        let mut description = NodeDescription {
            node_type: node_type.to_string(),
            description: metadata.description,
            category: metadata.category,
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            ports_error: None,
        };

        match factory.create("introspection", &HashMap::new()) {
            Ok(node) => {
                description.input_ports = node.input_ports().to_vec();
                description.output_ports = node.output_ports().to_vec();
            }
            Err(e) => {
                description.ports_error = Some(format!("Could not retrieve port information: {}", e));
            }
        }

        Ok(description)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
