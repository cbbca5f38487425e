//! Two-tier execution state: one [`WorkflowContext`] per run, one
//! [`NodeContext`] per node invocation.

mod path;

pub use path::{ContextPath, ContextScope, ContextSection, PathError};

use crate::{events::EventEmitter, NodeError, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One entry of the append-only error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub node_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl ErrorRecord {
    pub fn new(node_id: impl Into<String>, message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
            kind: kind.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: HashMap<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn from_node_error(node_id: impl Into<String>, error: &NodeError) -> Self {
        Self::new(node_id, error.to_string(), error.kind())
    }

    pub fn to_value(&self) -> Value {
        let mut map = HashMap::new();
        map.insert("node_id".to_string(), Value::from(self.node_id.as_str()));
        map.insert("message".to_string(), Value::from(self.message.as_str()));
        map.insert("timestamp".to_string(), Value::from(self.timestamp.to_rfc3339()));
        map.insert("kind".to_string(), Value::from(self.kind.as_str()));
        map.insert(
            "details".to_string(),
            self.details.clone().map(Value::Object).unwrap_or_default(),
        );
        Value::Object(map)
    }
}

/// How a propagated value is combined with what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagateOp {
    Set,
    Append,
    Increment,
}

/// Serializable view of a workflow context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub variables: HashMap<String, Value>,
    pub shared_data: HashMap<String, Value>,
    pub errors: Vec<ErrorRecord>,
    pub metadata: HashMap<String, Value>,
}

impl ContextSnapshot {
    pub fn resolve(&self, section: ContextSection, key: Option<&str>) -> Option<Value> {
        match section {
            ContextSection::Variables => section_value(&self.variables, key),
            ContextSection::SharedData => section_value(&self.shared_data, key),
            ContextSection::Metadata => section_value(&self.metadata, key),
            ContextSection::Errors => errors_value(&self.errors, key),
            ContextSection::InternalState => None,
        }
    }
}

type FlowState = ContextSnapshot;

/// Run-scoped state shared by every node. Cheap to clone; all clones see the
/// same data. Every accessor holds the lock only for its own duration.
#[derive(Clone)]
pub struct WorkflowContext {
    state: Arc<RwLock<FlowState>>,
}

impl WorkflowContext {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        let workflow_id: String = workflow_id.into();
        let now = Utc::now();
        let mut metadata = HashMap::new();
        metadata.insert("workflow_id".to_string(), Value::from(workflow_id));
        metadata.insert("execution_id".to_string(), Value::from(Uuid::new_v4().to_string()));
        metadata.insert("start_time".to_string(), Value::from(now.to_rfc3339()));
        metadata.insert("total_nodes".to_string(), Value::from(0i64));
        metadata.insert("completed_nodes".to_string(), Value::from(0i64));

        Self {
            state: Arc::new(RwLock::new(FlowState {
                metadata,
                ..FlowState::default()
            })),
        }
    }

    pub async fn set_variable(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.write().await.variables.insert(key.into(), value.into());
    }

    pub async fn get_variable(&self, key: &str) -> Option<Value> {
        lookup(&self.state.read().await.variables, key)
    }

    pub async fn variables(&self) -> HashMap<String, Value> {
        self.state.read().await.variables.clone()
    }

    pub async fn set_shared_data(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.write().await.shared_data.insert(key.into(), value.into());
    }

    pub async fn get_shared_data(&self, key: &str) -> Option<Value> {
        lookup(&self.state.read().await.shared_data, key)
    }

    /// Append to a list entry; a scalar already stored becomes the first item.
    pub async fn append_shared_data(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut state = self.state.write().await;
        append(&mut state.shared_data, key.into(), value.into());
    }

    pub async fn update_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.write().await.metadata.insert(key.into(), value.into());
    }

    pub async fn get_metadata(&self, key: &str) -> Option<Value> {
        lookup(&self.state.read().await.metadata, key)
    }

    pub async fn set_total_nodes(&self, total: usize) {
        self.update_metadata("total_nodes", total).await;
    }

    pub async fn increment_completed_nodes(&self) {
        let mut state = self.state.write().await;
        increment(&mut state.metadata, "completed_nodes".to_string(), 1.0);
    }

    pub async fn add_error(&self, record: ErrorRecord) {
        self.state.write().await.errors.push(record);
    }

    pub async fn record_error(&self, node_id: &str, error: &NodeError) {
        self.add_error(ErrorRecord::from_node_error(node_id, error)).await;
    }

    pub async fn errors(&self) -> Vec<ErrorRecord> {
        self.state.read().await.errors.clone()
    }

    /// Errors filtered by node and/or kind.
    pub async fn errors_for(&self, node_id: Option<&str>, kind: Option<&str>) -> Vec<ErrorRecord> {
        self.state
            .read()
            .await
            .errors
            .iter()
            .filter(|e| node_id.map_or(true, |n| e.node_id == n))
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect()
    }

    /// Write into the section named by `target`. Returns false when the
    /// combination is not applicable (read-only section, non-numeric increment).
    pub async fn apply(&self, target: &ContextPath, op: PropagateOp, value: Value) -> bool {
        let Some(key) = target.key.clone() else {
            return false;
        };
        let mut state = self.state.write().await;
        let map = match target.section {
            ContextSection::Variables => &mut state.variables,
            ContextSection::SharedData => &mut state.shared_data,
            ContextSection::Metadata => &mut state.metadata,
            ContextSection::Errors | ContextSection::InternalState => return false,
        };
        match op {
            PropagateOp::Set => {
                map.insert(key, value);
                true
            }
            PropagateOp::Append => {
                append(map, key, value);
                true
            }
            PropagateOp::Increment => match value.as_f64() {
                Some(delta) => increment(map, key, delta),
                None => {
                    tracing::debug!(target_path = %target, value = value.type_name(), "Cannot increment by a non-number");
                    false
                }
            },
        }
    }

    /// Read a section slot. `None` means "not found".
    pub async fn resolve(&self, section: ContextSection, key: Option<&str>) -> Option<Value> {
        self.state.read().await.resolve(section, key)
    }

    pub async fn snapshot(&self) -> ContextSnapshot {
        self.state.read().await.clone()
    }
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new(format!("wf_{}", Utc::now().timestamp()))
    }
}

/// Node-local state kept for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeContextSnapshot {
    pub node_id: String,
    pub variables: HashMap<String, Value>,
    pub internal_state: HashMap<String, Value>,
    pub errors: Vec<ErrorRecord>,
    pub metadata: HashMap<String, Value>,
}

impl NodeContextSnapshot {
    pub fn resolve(&self, section: ContextSection, key: Option<&str>) -> Option<Value> {
        match section {
            ContextSection::Variables => section_value(&self.variables, key),
            ContextSection::InternalState => section_value(&self.internal_state, key),
            ContextSection::Metadata => section_value(&self.metadata, key),
            ContextSection::Errors => errors_value(&self.errors, key),
            ContextSection::SharedData => None,
        }
    }
}

/// Point-in-time view used for synchronous path resolution.
#[derive(Debug, Clone, Default)]
pub struct ContextView {
    pub flow: ContextSnapshot,
    pub node: Option<NodeContextSnapshot>,
}

impl ContextView {
    pub fn resolve(&self, path: &ContextPath) -> Option<Value> {
        let key = path.key.as_deref();
        match path.scope {
            ContextScope::Flow => self.flow.resolve(path.section, key),
            ContextScope::Node => self.node.as_ref()?.resolve(path.section, key),
        }
    }
}

/// Per-invocation context bound to the run's [`WorkflowContext`].
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: String,
    pub events: EventEmitter,
    flow: WorkflowContext,
    local: Arc<RwLock<NodeContextSnapshot>>,
}

impl NodeContext {
    pub fn new(node_id: impl Into<String>, flow: WorkflowContext, events: EventEmitter) -> Self {
        let node_id = node_id.into();
        let mut metadata = HashMap::new();
        metadata.insert("node_id".to_string(), Value::from(node_id.as_str()));
        metadata.insert("start_time".to_string(), Value::from(Utc::now().to_rfc3339()));
        metadata.insert("retry_count".to_string(), Value::from(0i64));

        Self {
            local: Arc::new(RwLock::new(NodeContextSnapshot {
                node_id: node_id.clone(),
                metadata,
                ..NodeContextSnapshot::default()
            })),
            node_id,
            events,
            flow,
        }
    }

    /// Context with a detached emitter, for driving a node by hand.
    pub fn standalone(node_id: impl Into<String>, flow: WorkflowContext) -> Self {
        let node_id = node_id.into();
        let events = EventEmitter::detached(node_id.as_str());
        Self::new(node_id, flow, events)
    }

    pub fn flow(&self) -> &WorkflowContext {
        &self.flow
    }

    pub async fn set_variable(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.local.write().await.variables.insert(key.into(), value.into());
    }

    pub async fn get_variable(&self, key: &str) -> Option<Value> {
        lookup(&self.local.read().await.variables, key)
    }

    pub async fn set_internal_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.local.write().await.internal_state.insert(key.into(), value.into());
    }

    pub async fn get_internal_state(&self, key: &str) -> Option<Value> {
        lookup(&self.local.read().await.internal_state, key)
    }

    pub async fn update_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.local.write().await.metadata.insert(key.into(), value.into());
    }

    pub async fn retry_count(&self) -> u64 {
        self.local
            .read()
            .await
            .metadata
            .get("retry_count")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as u64
    }

    pub async fn increment_retry_count(&self) {
        let mut local = self.local.write().await;
        increment(&mut local.metadata, "retry_count".to_string(), 1.0);
    }

    /// Record an error locally and in the workflow context.
    pub async fn add_error(&self, message: impl Into<String>, kind: impl Into<String>) {
        let record = ErrorRecord::new(self.node_id.as_str(), message, kind);
        self.push_error(record).await;
    }

    pub async fn record_error(&self, error: &NodeError) {
        let record = ErrorRecord::from_node_error(self.node_id.as_str(), error);
        self.push_error(record).await;
    }

    async fn push_error(&self, record: ErrorRecord) {
        self.local.write().await.errors.push(record.clone());
        self.flow.add_error(record).await;
    }

    pub async fn errors(&self) -> Vec<ErrorRecord> {
        self.local.read().await.errors.clone()
    }

    /// Copy local variable `key` into the workflow context at `target`
    /// (e.g. `variables.user_count`). Returns Ok(false) when the local
    /// variable is unset or the operation does not apply.
    pub async fn propagate_to_flow(
        &self,
        key: &str,
        target: &str,
        op: PropagateOp,
    ) -> Result<bool, PathError> {
        let path = ContextPath::parse_target(target)?;
        match self.get_variable(key).await {
            Some(Value::Null) | None => Ok(false),
            Some(value) => Ok(self.flow.apply(&path, op, value).await),
        }
    }

    pub async fn resolve(&self, section: ContextSection, key: Option<&str>) -> Option<Value> {
        self.local.read().await.resolve(section, key)
    }

    pub async fn snapshot(&self) -> NodeContextSnapshot {
        self.local.read().await.clone()
    }
}

/// Owns the workflow context of one run and the node contexts minted for it.
pub struct ContextManager {
    flow: WorkflowContext,
    node_contexts: HashMap<String, NodeContext>,
}

impl ContextManager {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self::with_context(WorkflowContext::new(workflow_id))
    }

    pub fn with_context(flow: WorkflowContext) -> Self {
        Self {
            flow,
            node_contexts: HashMap::new(),
        }
    }

    pub fn flow_context(&self) -> &WorkflowContext {
        &self.flow
    }

    pub fn create_node_context(&mut self, node_id: &str, events: EventEmitter) -> NodeContext {
        let ctx = NodeContext::new(node_id, self.flow.clone(), events);
        self.node_contexts.insert(node_id.to_string(), ctx.clone());
        ctx
    }

    pub fn get_node_context(&self, node_id: &str) -> Option<&NodeContext> {
        self.node_contexts.get(node_id)
    }

    pub fn cleanup_node_context(&mut self, node_id: &str) {
        self.node_contexts.remove(node_id);
    }

    /// Resolve a typed path. Node-scoped paths are read from `current_node`.
    pub async fn resolve(&self, path: &ContextPath, current_node: Option<&str>) -> Option<Value> {
        match path.scope {
            ContextScope::Flow => self.flow.resolve(path.section, path.key.as_deref()).await,
            ContextScope::Node => {
                let ctx = self.node_contexts.get(current_node?)?;
                ctx.resolve(path.section, path.key.as_deref()).await
            }
        }
    }

    /// Snapshot of the workflow context plus, when known, `current_node`'s context.
    pub async fn view(&self, current_node: Option<&str>) -> ContextView {
        let node = match current_node.and_then(|id| self.node_contexts.get(id)) {
            Some(ctx) => Some(ctx.snapshot().await),
            None => None,
        };
        ContextView {
            flow: self.flow.snapshot().await,
            node,
        }
    }

    /// Resolve a context expression string; anything that is not a
    /// resolvable context path comes back unchanged.
    pub async fn resolve_reference(&self, expr: &str, current_node: Option<&str>) -> Value {
        if let Ok(path) = ContextPath::parse(expr) {
            if let Some(value) = self.resolve(&path, current_node).await {
                return value;
            }
        }
        Value::from(expr)
    }
}

fn lookup(map: &HashMap<String, Value>, key: &str) -> Option<Value> {
    if let Some(value) = map.get(key) {
        return Some(value.clone());
    }
    let mut segments = key.split('.');
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

fn section_value(map: &HashMap<String, Value>, key: Option<&str>) -> Option<Value> {
    match key {
        Some(key) => lookup(map, key),
        None => Some(Value::Object(map.clone())),
    }
}

fn errors_value(errors: &[ErrorRecord], key: Option<&str>) -> Option<Value> {
    match key {
        None => Some(Value::Array(errors.iter().map(ErrorRecord::to_value).collect())),
        Some("length") => Some(Value::from(errors.len())),
        Some(index) => {
            let mut segments = index.split('.');
            let i = segments.next()?.parse::<usize>().ok()?;
            let mut current = errors.get(i)?.to_value();
            for segment in segments {
                current = current.get(segment)?.clone();
            }
            Some(current)
        }
    }
}

fn append(map: &mut HashMap<String, Value>, key: String, value: Value) {
    match map.remove(&key) {
        None => {
            map.insert(key, Value::Array(vec![value]));
        }
        Some(Value::Array(mut items)) => {
            items.push(value);
            map.insert(key, Value::Array(items));
        }
        Some(existing) => {
            map.insert(key, Value::Array(vec![existing, value]));
        }
    }
}

fn increment(map: &mut HashMap<String, Value>, key: String, delta: f64) -> bool {
    match map.get(&key) {
        None | Some(Value::Null) => {
            map.insert(key, Value::Number(delta));
            true
        }
        Some(Value::Number(current)) => {
            let next = current + delta;
            map.insert(key, Value::Number(next));
            true
        }
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn variables_and_metadata_counters() {
        let ctx = WorkflowContext::new("wf");
        ctx.set_variable("x", "y").await;
        assert_eq!(ctx.get_variable("x").await, Some(Value::from("y")));
        assert_eq!(ctx.get_variable("missing").await, None);

        ctx.set_total_nodes(3).await;
        ctx.increment_completed_nodes().await;
        ctx.increment_completed_nodes().await;
        assert_eq!(ctx.get_metadata("total_nodes").await, Some(Value::from(3usize)));
        assert_eq!(ctx.get_metadata("completed_nodes").await, Some(Value::from(2i64)));
        assert_eq!(ctx.get_metadata("workflow_id").await, Some(Value::from("wf")));
    }

    #[tokio::test]
    async fn append_turns_scalar_into_list() {
        let ctx = WorkflowContext::new("wf");
        ctx.set_shared_data("items", 1i64).await;
        ctx.append_shared_data("items", 2i64).await;
        ctx.append_shared_data("fresh", "a").await;
        assert_eq!(
            ctx.get_shared_data("items").await,
            Some(Value::Array(vec![Value::from(1i64), Value::from(2i64)]))
        );
        assert_eq!(ctx.get_shared_data("fresh").await, Some(Value::Array(vec![Value::from("a")])));
    }

    #[tokio::test]
    async fn nested_lookup_walks_objects() {
        let ctx = WorkflowContext::new("wf");
        ctx.set_variable("user", Value::from(serde_json::json!({"name": "gil"}))).await;
        assert_eq!(ctx.get_variable("user.name").await, Some(Value::from("gil")));
    }

    #[tokio::test]
    async fn errors_filter_by_node_and_kind() {
        let ctx = WorkflowContext::new("wf");
        ctx.record_error("a", &NodeError::execution("a", "boom")).await;
        ctx.record_error("b", &NodeError::missing_input("value")).await;
        ctx.add_error(ErrorRecord::new("b", "late", "timeout")).await;

        assert_eq!(ctx.errors().await.len(), 3);
        assert_eq!(ctx.errors_for(Some("b"), None).await.len(), 2);
        let timeouts = ctx.errors_for(Some("b"), Some("timeout")).await;
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].message, "late");
    }

    #[tokio::test]
    async fn node_errors_propagate_to_flow() {
        let flow = WorkflowContext::new("wf");
        let node = NodeContext::standalone("n1", flow.clone());
        node.add_error("bad thing", "general").await;

        assert_eq!(node.errors().await.len(), 1);
        let flow_errors = flow.errors().await;
        assert_eq!(flow_errors.len(), 1);
        assert_eq!(flow_errors[0].node_id, "n1");
    }

    #[tokio::test]
    async fn propagation_operations() {
        let flow = WorkflowContext::new("wf");
        let node = NodeContext::standalone("counter", flow.clone());

        node.set_variable("hits", 2i64).await;
        assert!(node.propagate_to_flow("hits", "variables.total", PropagateOp::Increment).await.unwrap());
        assert!(node.propagate_to_flow("hits", "variables.total", PropagateOp::Increment).await.unwrap());
        assert_eq!(flow.get_variable("total").await, Some(Value::from(4i64)));

        node.set_variable("tag", "x").await;
        assert!(node.propagate_to_flow("tag", "shared_data.tags", PropagateOp::Append).await.unwrap());
        assert!(node.propagate_to_flow("tag", "metadata.last_tag", PropagateOp::Set).await.unwrap());
        assert_eq!(flow.get_shared_data("tags").await, Some(Value::Array(vec![Value::from("x")])));
        assert_eq!(flow.get_metadata("last_tag").await, Some(Value::from("x")));

        // Non-numeric increment and unset locals are soft no-ops.
        assert!(!node.propagate_to_flow("tag", "variables.total", PropagateOp::Increment).await.unwrap());
        assert!(!node.propagate_to_flow("nope", "variables.total", PropagateOp::Set).await.unwrap());
        assert!(node.propagate_to_flow("tag", "errors.x", PropagateOp::Set).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_lose_no_updates() {
        let flow = WorkflowContext::new("wf");
        let mut handles = Vec::new();
        for task in 0..64 {
            let node = NodeContext::standalone(format!("worker-{task}"), flow.clone());
            handles.push(tokio::spawn(async move {
                node.set_variable("one", 1i64).await;
                for _ in 0..50 {
                    node.propagate_to_flow("one", "variables.total", PropagateOp::Increment)
                        .await
                        .unwrap();
                    node.propagate_to_flow("one", "shared_data.log", PropagateOp::Append)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(flow.get_variable("total").await, Some(Value::from(3200i64)));
        let log = flow.get_shared_data("log").await.unwrap();
        assert_eq!(log.as_array().map(Vec::len), Some(3200));
    }

    #[tokio::test]
    async fn retry_count_starts_at_zero() {
        let node = NodeContext::standalone("n", WorkflowContext::new("wf"));
        assert_eq!(node.retry_count().await, 0);
        node.increment_retry_count().await;
        assert_eq!(node.retry_count().await, 1);
    }

    #[tokio::test]
    async fn manager_resolves_flow_and_node_paths() {
        let mut manager = ContextManager::new("wf");
        manager.flow_context().set_variable("user_id", "u-1").await;
        manager
            .flow_context()
            .add_error(ErrorRecord::new("x", "oops", "general"))
            .await;

        let node = manager.create_node_context("n1", EventEmitter::detached("n1"));
        node.set_internal_state("cursor", 7i64).await;

        let user = ContextPath::parse("${flow_context.variables.user_id}").unwrap();
        assert_eq!(manager.resolve(&user, None).await, Some(Value::from("u-1")));

        let count = ContextPath::parse("flow_context.errors.length").unwrap();
        assert_eq!(manager.resolve(&count, None).await, Some(Value::from(1usize)));

        let first_node = ContextPath::parse("flow_context.errors.0.node_id").unwrap();
        assert_eq!(manager.resolve(&first_node, None).await, Some(Value::from("x")));

        let cursor = ContextPath::parse("node_context.internal_state.cursor").unwrap();
        assert_eq!(manager.resolve(&cursor, Some("n1")).await, Some(Value::from(7i64)));
        assert_eq!(manager.resolve(&cursor, None).await, None);
        assert_eq!(manager.resolve(&cursor, Some("other")).await, None);

        manager.cleanup_node_context("n1");
        assert!(manager.get_node_context("n1").is_none());
    }

    #[tokio::test]
    async fn view_matches_live_resolution() {
        let mut manager = ContextManager::new("wf");
        manager.flow_context().set_shared_data("k", 1i64).await;
        let node = manager.create_node_context("n", EventEmitter::detached("n"));
        node.set_variable("local", "yes").await;

        let view = manager.view(Some("n")).await;
        let shared = ContextPath::parse("flow_context.shared_data.k").unwrap();
        let local = ContextPath::parse("node_context.variables.local").unwrap();
        let retries = ContextPath::parse("node_context.metadata.retry_count").unwrap();
        assert_eq!(view.resolve(&shared), manager.resolve(&shared, Some("n")).await);
        assert_eq!(view.resolve(&local), Some(Value::from("yes")));
        assert_eq!(view.resolve(&retries), Some(Value::from(0i64)));
        assert_eq!(manager.view(None).await.resolve(&local), None);
    }

    #[tokio::test]
    async fn unknown_paths_are_soft_failures() {
        let manager = ContextManager::new("wf");
        let missing = ContextPath::parse("flow_context.variables.nope").unwrap();
        assert_eq!(manager.resolve(&missing, None).await, None);
        assert_eq!(
            manager.resolve_reference("${flow_context.variables.nope}", None).await,
            Value::from("${flow_context.variables.nope}")
        );
        assert_eq!(
            manager.resolve_reference("plain text", None).await,
            Value::from("plain text")
        );
    }

    #[tokio::test]
    async fn snapshot_serializes_as_nested_mapping() {
        let ctx = WorkflowContext::new("wf");
        ctx.set_variable("v", "y").await;
        let json = serde_json::to_value(ctx.snapshot().await).unwrap();
        assert_eq!(json["variables"]["v"], "y");
        assert!(json["errors"].as_array().unwrap().is_empty());
        assert_eq!(json["metadata"]["completed_nodes"], 0);
    }
}
