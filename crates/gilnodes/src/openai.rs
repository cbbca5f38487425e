use async_trait::async_trait;
use gilcore::{
    DataKind, Node, NodeContext, NodeDescriptor, NodeError, NodeOutput, Port, PortValues, Value,
};
use gilruntime::{NodeFactory, NodeTypeMetadata};
use std::collections::HashMap;

pub const NODE_TYPE: &str = "openai.connector";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ENDPOINT: &str = "chat.completions.create";

/// Supported API operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ChatCompletions,
    ImageGeneration,
}

impl Endpoint {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "chat.completions.create" => Some(Endpoint::ChatCompletions),
            "images.generate" => Some(Endpoint::ImageGeneration),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ChatCompletions => "/chat/completions",
            Endpoint::ImageGeneration => "/images/generations",
        }
    }
}

/// Calls the OpenAI REST API. Failures are reported on the `error` output,
/// never raised, so downstream nodes can branch on them.
pub struct OpenAIConnectorNode {
    descriptor: NodeDescriptor,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    organization: Option<String>,
}

fn config_str(config: &HashMap<String, Value>, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl OpenAIConnectorNode {
    pub fn new(id: &str, config: &HashMap<String, Value>) -> Result<Self, NodeError> {
        // an unset `${OPENAI_API_KEY}` survives resolution as the literal placeholder
        let api_key = config_str(config, "api_key")
            .filter(|key| !key.starts_with("${"))
            .ok_or_else(|| NodeError::Configuration(format!("Missing 'api_key' in config for {}", id)))?;
        let base_url = config_str(config, "base_url").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| NodeError::Configuration(format!("HTTP client setup failed: {}", e)))?;

        let mut redacted = config.clone();
        redacted.insert("api_key".to_string(), Value::from("***"));

        Ok(Self {
            descriptor: NodeDescriptor::new(id, NODE_TYPE)
                .with_name("OpenAI Connector")
                .with_config(redacted)
                .with_input(
                    Port::input("request_data", DataKind::Json)
                        .with_description("API request: {endpoint, params}"),
                )
                .with_output(Port::output("response", DataKind::Json).with_description("API response data"))
                .with_output(Port::output("error", DataKind::Text).with_description("Error message")),
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            organization: config_str(config, "organization"),
        })
    }

    async fn call(&self, request: &Value) -> Result<serde_json::Value, String> {
        let request = request
            .as_object()
            .ok_or_else(|| "request_data must be a JSON object".to_string())?;
        let name = request
            .get("endpoint")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ENDPOINT);
        let endpoint = Endpoint::parse(name).ok_or_else(|| format!("Unsupported endpoint: {}", name))?;
        let params = request
            .get("params")
            .map(Value::to_json)
            .unwrap_or_else(|| serde_json::json!({}));

        let url = format!("{}{}", self.base_url, endpoint.path());
        let mut builder = self.client.post(&url).bearer_auth(&self.api_key).json(&params);
        if let Some(organization) = &self.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| format!("Request to {} failed: {}", url, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {}", e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(format!("HTTP {}: {}", status.as_u16(), message));
        }

        serde_json::from_str(&body).map_err(|e| format!("Invalid JSON response: {}", e))
    }
}

#[async_trait]
impl Node for OpenAIConnectorNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, inputs: PortValues, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let request = inputs.get("request_data").cloned().unwrap_or_default();

        let output = match self.call(&request).await {
            Ok(response) => NodeOutput::new()
                .with_output("response", Value::from(response))
                .with_output("error", Value::Null),
            Err(message) => {
                tracing::warn!(node_id = %self.id(), error = %message, "OpenAI request failed");
                ctx.events.warn(message.clone());
                NodeOutput::new()
                    .with_output("response", Value::Null)
                    .with_output("error", message)
            }
        };
        Ok(output)
    }
}

pub struct OpenAIConnectorFactory;

impl NodeFactory for OpenAIConnectorFactory {
    fn create(&self, id: &str, config: &HashMap<String, Value>) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(OpenAIConnectorNode::new(id, config)?))
    }

    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn metadata(&self) -> NodeTypeMetadata {
        NodeTypeMetadata::new("Connector for the OpenAI chat and image APIs", "ai")
    }
}
