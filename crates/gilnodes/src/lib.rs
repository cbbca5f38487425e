//! Standard node library
//!
//! Built-in nodes: logging, context variables, branching and the OpenAI
//! connector.

mod branch;
mod log_message;
mod openai;
mod set_variable;

pub use branch::{BranchFactory, BranchNode};
pub use log_message::{LogMessageFactory, LogMessageNode};
pub use openai::{Endpoint, OpenAIConnectorFactory, OpenAIConnectorNode};
pub use set_variable::{SetVariableFactory, SetVariableNode};

use gilruntime::{NodeFactory, NodeRegistry, Plugin, PluginEntries};
use std::sync::Arc;

fn entry(name: &str, factory: &Arc<dyn NodeFactory>) -> (String, Arc<dyn NodeFactory>) {
    (name.to_string(), Arc::clone(factory))
}

/// Utility and control nodes under their qualified and short names
fn core_entries() -> PluginEntries {
    let log: Arc<dyn NodeFactory> = Arc::new(LogMessageFactory);
    let set: Arc<dyn NodeFactory> = Arc::new(SetVariableFactory);
    let branch: Arc<dyn NodeFactory> = Arc::new(BranchFactory);
    vec![
        entry(log_message::NODE_TYPE, &log),
        entry("LogMessage", &log),
        entry(set_variable::NODE_TYPE, &set),
        entry("SetVariable", &set),
        entry(branch::NODE_TYPE, &branch),
        entry("Branch", &branch),
    ]
}

fn openai_entries() -> PluginEntries {
    let openai: Arc<dyn NodeFactory> = Arc::new(OpenAIConnectorFactory);
    vec![
        entry(openai::NODE_TYPE, &openai),
        entry("OpenAIConnector", &openai),
    ]
}

/// The built-in node packages as plugins, for [`NodeRegistry::discover`]
pub fn builtin_plugins() -> Vec<Plugin> {
    vec![
        Plugin::new("gil-nodes-core", || Ok(core_entries())),
        Plugin::new("gil-node-openai", || Ok(openai_entries())),
    ]
}

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.discover(&builtin_plugins());
}
