use async_trait::async_trait;
use gilcore::{
    DataKind, Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, Port, PortValues, Value,
};
use gilruntime::{NodeFactory, NodeTypeMetadata};
use std::collections::HashMap;

pub const NODE_TYPE: &str = "util.log_message";

/// Logs its input and passes it through unchanged
pub struct LogMessageNode {
    descriptor: NodeDescriptor,
    prefix: String,
}

impl LogMessageNode {
    pub fn new(id: &str, config: &HashMap<String, Value>) -> Self {
        let prefix = config
            .get("prefix")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("[{}]", id));

        Self {
            descriptor: NodeDescriptor::new(id, NODE_TYPE)
                .with_name("Log Message")
                .with_config(config.clone())
                .with_input(
                    Port::input("input", DataKind::Any)
                        .optional()
                        .with_description("The data to be logged."),
                )
                .with_output(
                    Port::output("output", DataKind::Any)
                        .with_description("The same data that was logged."),
                ),
            prefix,
        }
    }
}

#[async_trait]
impl Node for LogMessageNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, mut inputs: PortValues, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let input = inputs.remove("input").unwrap_or_default();
        let line = format!("{} {}", self.prefix, input.to_display_string());

        tracing::info!(node_id = %self.id(), "{}", line);
        ctx.events.info(line);

        Ok(NodeOutput::new().with_output("output", input))
    }
}

pub struct LogMessageFactory;

impl NodeFactory for LogMessageFactory {
    fn create(&self, id: &str, config: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(LogMessageNode::new(id, config)))
    }

    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata::new(
            "Logs the input data and passes it through to the output",
            "util",
        )
    }
}
