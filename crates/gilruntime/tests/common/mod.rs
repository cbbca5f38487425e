#![allow(dead_code)]

use async_trait::async_trait;
use gilcore::{
    DataKind, Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, Port, PortValues, Value,
};
use gilruntime::{FnFactory, NodeRegistry, NodeTypeMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Passes `input` to `output`.
pub struct Echo {
    descriptor: NodeDescriptor,
}

#[async_trait]
impl Node for Echo {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, mut inputs: PortValues, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let value = inputs.remove("input").unwrap_or_default();
        Ok(NodeOutput::new().with_output("output", value))
    }
}

/// Always fails with the configured message.
pub struct Fail {
    descriptor: NodeDescriptor,
    message: String,
}

#[async_trait]
impl Node for Fail {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, _inputs: PortValues, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        Err(NodeError::execution(self.id(), self.message.clone()))
    }
}

/// Sleeps for `millis` before echoing.
pub struct Sleep {
    descriptor: NodeDescriptor,
    millis: u64,
}

#[async_trait]
impl Node for Sleep {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, _inputs: PortValues, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        ctx.set_variable("started", true).await;
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        Ok(NodeOutput::new().with_output("output", "slept"))
    }
}

/// Appends its id to the `visited` shared list.
pub struct Visit {
    descriptor: NodeDescriptor,
}

#[async_trait]
impl Node for Visit {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, _inputs: PortValues, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        ctx.flow().append_shared_data("visited", self.id()).await;
        Ok(NodeOutput::new())
    }
}

fn echo_descriptor(id: &str, node_type: &str) -> NodeDescriptor {
    NodeDescriptor::new(id, node_type)
        .with_input(Port::input("input", DataKind::Any).optional())
        .with_output(Port::output("output", DataKind::Any))
}

pub fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(
        FnFactory::new("Echo", |id, _config| {
            Ok(Box::new(Echo {
                descriptor: echo_descriptor(id, "Echo"),
            }) as Box<dyn Node>)
        })
        .with_metadata(NodeTypeMetadata::new("Echoes its input", "test")),
    ));
    registry.register(Arc::new(FnFactory::new("Fail", |id, config| {
        let message = config
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("boom")
            .to_string();
        Ok(Box::new(Fail {
            descriptor: NodeDescriptor::new(id, "Fail"),
            message,
        }) as Box<dyn Node>)
    })));
    registry.register(Arc::new(FnFactory::new("Sleep", |id, config| {
        let millis = config.get("millis").and_then(Value::as_f64).unwrap_or(50.0) as u64;
        Ok(Box::new(Sleep {
            descriptor: echo_descriptor(id, "Sleep"),
            millis,
        }) as Box<dyn Node>)
    })));
    registry.register(Arc::new(FnFactory::new("Visit", |id, _config| {
        Ok(Box::new(Visit {
            descriptor: NodeDescriptor::new(id, "Visit"),
        }) as Box<dyn Node>)
    })));
    registry.register(Arc::new(FnFactory::new("NeedsConfig", |_id, config| {
        if config.contains_key("required") {
            Ok(Box::new(Visit {
                descriptor: NodeDescriptor::new("unused", "NeedsConfig"),
            }) as Box<dyn Node>)
        } else {
            Err(NodeError::Configuration("'required' is missing".into()))
        }
    })));
    registry
}

pub fn inputs(pairs: serde_json::Value) -> PortValues {
    match Value::from(pairs) {
        Value::Object(map) => map,
        _ => HashMap::new(),
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}
