//! Workflow execution runtime
//!
//! This crate provides the node registry, the graph builder that turns a
//! flow specification into an ordered dependency graph, and the executor
//! that runs nodes in that order.

mod executor;
mod graph;
mod registry;
mod runtime;

pub use executor::{ErrorHandling, ExecutionResult, ExecutorConfig, RunPhase, WorkflowExecutor};
pub use graph::{GraphBuilder, ValidationReport, WorkflowGraph};
pub use registry::{
    FnFactory, NodeDescription, NodeFactory, NodeRegistry, NodeTypeMetadata, Plugin, PluginEntries,
};
pub use runtime::{GilRuntime, RuntimeConfig};
