use async_trait::async_trait;
use gilcore::{
    DataKind, Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, Port, PortValues, Value,
};
use gilruntime::{NodeFactory, NodeTypeMetadata};
use std::collections::HashMap;

pub const NODE_TYPE: &str = "control.branch";

/// Routes `input` to `true_output` or `false_output`. The untaken side is
/// always null.
pub struct BranchNode {
    descriptor: NodeDescriptor,
}

impl BranchNode {
    pub fn new(id: &str, config: &HashMap<String, Value>) -> Self {
        Self {
            descriptor: NodeDescriptor::new(id, NODE_TYPE)
                .with_name("Branch")
                .with_config(config.clone())
                .with_input(
                    Port::input("condition", DataKind::Boolean)
                        .with_description("The boolean value to determine the branch."),
                )
                .with_input(
                    Port::input("input", DataKind::Any)
                        .optional()
                        .with_description("The data to pass through to the selected branch."),
                )
                .with_output(
                    Port::output("true_output", DataKind::Any)
                        .with_description("Output for when the condition is true."),
                )
                .with_output(
                    Port::output("false_output", DataKind::Any)
                        .with_description("Output for when the condition is false."),
                ),
        }
    }
}

#[async_trait]
impl Node for BranchNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, mut inputs: PortValues, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let condition = inputs
            .get("condition")
            .and_then(Value::as_bool)
            .ok_or_else(|| NodeError::missing_input("condition"))?;
        let input = inputs.remove("input").unwrap_or_default();

        let (taken, untaken) = if condition {
            ("true_output", "false_output")
        } else {
            ("false_output", "true_output")
        };

        Ok(NodeOutput::new()
            .with_output(taken, input)
            .with_output(untaken, Value::Null))
    }
}

pub struct BranchFactory;

impl NodeFactory for BranchFactory {
    fn create(&self, id: &str, config: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(BranchNode::new(id, config)))
    }

    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata::new("Directs execution flow based on a boolean condition", "control")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gilcore::{NodeInstance, WorkflowContext};
    use serde_json::json;

    async fn branch(condition: Value, input: Value) -> Result<PortValues, NodeError> {
        let node = NodeInstance::new(Box::new(BranchNode::new("b", &HashMap::new())));
        let ctx = NodeContext::standalone("b", WorkflowContext::new("test"));
        let mut inputs = PortValues::new();
        inputs.insert("condition".into(), condition);
        inputs.insert("input".into(), input);
        node.run(inputs, &ctx).await.map(|o| o.outputs)
    }

    #[tokio::test]
    async fn exactly_one_side_carries_data() {
        for value in [Value::from("v"), Value::from(0i64), Value::from(json!({"k": [1]}))] {
            let taken = branch(Value::from(true), value.clone()).await.unwrap();
            assert_eq!(taken["true_output"], value);
            assert_eq!(taken["false_output"], Value::Null);

            let taken = branch(Value::from(false), value.clone()).await.unwrap();
            assert_eq!(taken["true_output"], Value::Null);
            assert_eq!(taken["false_output"], value);
        }
    }

    #[tokio::test]
    async fn condition_must_be_boolean() {
        let err = branch(Value::from("yes"), Value::from(1i64)).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput { ref port, .. } if port == "condition"));

        let err = branch(Value::Null, Value::from(1i64)).await.unwrap_err();
        assert_eq!(err, NodeError::missing_input("condition"));
    }
}
