//! Core abstractions for the Gil workflow engine
//!
//! This crate provides the data model every other component shares:
//! values and ports, the node contract, workflow documents, the two-level
//! execution context and reference resolution. It has no runtime.

pub mod context;
mod error;
pub mod events;
mod node;
mod port;
mod reference;
mod value;
mod workflow;

pub use context::{
    ContextManager, ContextPath, ContextScope, ContextSection, ContextSnapshot, ContextView,
    ErrorRecord, NodeContext, NodeContextSnapshot, PathError, PropagateOp, WorkflowContext,
};
pub use error::{FlowError, NodeError, WorkflowError};
pub use events::*;
pub use node::{
    Node, NodeDescriptor, NodeId, NodeInstance, NodeMetadata, NodeOutput, NodeRunState, PortValues,
};
pub use port::{DataKind, Port};
pub use reference::ReferenceResolver;
pub use value::Value;
pub use workflow::{Connection, FlowStep, NodeSpec, NodeTable, WorkflowConfig};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
