use crate::{FlowError, Value};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Parsed workflow specification. Immutable once handed to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    pub nodes: NodeTable,
    #[serde(default)]
    pub flow: Vec<FlowStep>,
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
}

fn default_name() -> String {
    "Unnamed Workflow".to_string()
}

impl WorkflowConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            environment: HashMap::new(),
            nodes: NodeTable::default(),
            flow: Vec::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, FlowError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load by extension: `.json` is read as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_node(mut self, id: impl Into<String>, spec: NodeSpec) -> Self {
        self.nodes.insert(id, spec);
        self
    }

    pub fn with_step(mut self, step: impl Into<FlowStep>) -> Self {
        self.flow.push(step.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, expr: impl Into<Value>) -> Self {
        self.outputs.insert(name.into(), expr.into());
        self
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    /// Node ids in declaration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|(id, _)| id)
    }
}

/// Node specification in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
}

impl NodeSpec {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            config: HashMap::new(),
            inputs: HashMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }
}

/// Node specs keyed by id, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTable {
    entries: Vec<(String, NodeSpec)>,
}

impl NodeTable {
    /// Insert or replace; a replaced entry keeps its original position.
    pub fn insert(&mut self, id: impl Into<String>, spec: NodeSpec) {
        let id = id.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, slot)) => *slot = spec,
            None => self.entries.push((id, spec)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&NodeSpec> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for NodeTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, spec) in &self.entries {
            map.serialize_entry(id, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NodeTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = NodeTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of node id to node spec")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<NodeTable, A::Error> {
                let mut table = NodeTable::default();
                while let Some((id, spec)) = access.next_entry::<String, NodeSpec>()? {
                    if table.contains(&id) {
                        return Err(serde::de::Error::custom(format!("duplicate node id '{}'", id)));
                    }
                    table.entries.push((id, spec));
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// One entry of the `flow` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowStep {
    /// Runs after everything in the current frontier.
    Node(String),
    /// Each listed node runs after the whole frontier.
    Parallel(Vec<String>),
    /// Explicit dependency declaration.
    Depends {
        node: String,
        #[serde(default, alias = "dependsOn")]
        depends_on: Vec<String>,
    },
}

impl FlowStep {
    pub fn depends(node: impl Into<String>, on: &[&str]) -> Self {
        FlowStep::Depends {
            node: node.into(),
            depends_on: on.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Every node id this step mentions.
    pub fn referenced_nodes(&self) -> Vec<&str> {
        match self {
            FlowStep::Node(id) => vec![id.as_str()],
            FlowStep::Parallel(ids) => ids.iter().map(String::as_str).collect(),
            FlowStep::Depends { node, depends_on } => std::iter::once(node.as_str())
                .chain(depends_on.iter().map(String::as_str))
                .collect(),
        }
    }
}

impl From<&str> for FlowStep {
    fn from(id: &str) -> Self {
        FlowStep::Node(id.to_string())
    }
}

impl From<String> for FlowStep {
    fn from(id: String) -> Self {
        FlowStep::Node(id)
    }
}

impl From<Vec<&str>> for FlowStep {
    fn from(ids: Vec<&str>) -> Self {
        FlowStep::Parallel(ids.into_iter().map(str::to_string).collect())
    }
}

/// Directed dependency edge between two nodes. Describes where data is
/// meant to flow; carries none itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub source_node: String,
    pub source_port: String,
    pub target_node: String,
    pub target_port: String,
    pub active: bool,
}

impl Connection {
    pub fn new(
        source_node: impl Into<String>,
        source_port: impl Into<String>,
        target_node: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_node: source_node.into(),
            source_port: source_port.into(),
            target_node: target_node.into(),
            target_port: target_port.into(),
            active: true,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source_node, self.source_port, self.target_node, self.target_port
        )
    }
}
