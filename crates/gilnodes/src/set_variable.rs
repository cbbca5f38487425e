use async_trait::async_trait;
use gilcore::{
    DataKind, Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, Port, PortValues, Value,
};
use gilruntime::{NodeFactory, NodeTypeMetadata};
use std::collections::HashMap;

pub const NODE_TYPE: &str = "util.set_variable";

/// Writes its `value` input into the workflow context
pub struct SetVariableNode {
    descriptor: NodeDescriptor,
    variable_name: String,
}

impl SetVariableNode {
    pub fn new(id: &str, config: &HashMap<String, Value>) -> Result<Self, NodeError> {
        let variable_name = config
            .get("variable_name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                NodeError::Configuration(format!("Missing 'variable_name' in config for {}", id))
            })?
            .to_string();

        Ok(Self {
            descriptor: NodeDescriptor::new(id, NODE_TYPE)
                .with_name("Set Variable")
                .with_config(config.clone())
                .with_input(
                    Port::input("value", DataKind::Any)
                        .with_description("The value to set for the variable."),
                ),
            variable_name,
        })
    }

    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }
}

#[async_trait]
impl Node for SetVariableNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, mut inputs: PortValues, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let value = inputs.remove("value").unwrap_or_default();
        tracing::debug!(node_id = %self.id(), variable = %self.variable_name, "Setting workflow variable");
        ctx.flow().set_variable(self.variable_name.clone(), value).await;
        Ok(NodeOutput::new())
    }
}

pub struct SetVariableFactory;

impl NodeFactory for SetVariableFactory {
    fn create(&self, id: &str, config: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SetVariableNode::new(id, config)?))
    }

    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata::new("Sets a variable in the workflow context", "util")
    }
}
