//! Resolution of reference strings embedded in node `config` and `inputs`.
//!
//! Supported forms:
//! - `@node.port[.field...]` reads a recorded upstream output
//! - `${input.key}`, `${timestamp}`, `${VAR}` and `${VAR|default}`
//! - `${flow_context.section.key}` / `${node_context.section.key}`
//!
//! Anything that cannot be resolved is returned exactly as written.

use crate::context::{ContextPath, ContextView};
use crate::{PortValues, Value};
use chrono::Utc;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

fn node_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^@([\w-]+)((?:\.[\w-]+)*)$").expect("valid node reference pattern"))
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^{}]*)\}").expect("valid placeholder pattern"))
}

/// Binds reference strings against one run's state.
#[derive(Default)]
pub struct ReferenceResolver<'a> {
    inputs: Option<&'a PortValues>,
    environment: Option<&'a HashMap<String, String>>,
    results: Option<&'a HashMap<String, PortValues>>,
    declared: HashSet<&'a str>,
    context: Option<&'a ContextView>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workflow-level inputs, read by `${input.key}`.
    pub fn with_inputs(mut self, inputs: &'a PortValues) -> Self {
        self.inputs = Some(inputs);
        self
    }

    /// Workflow `environment` table; consulted before process variables.
    pub fn with_environment(mut self, environment: &'a HashMap<String, String>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Outputs recorded so far, keyed by node id.
    pub fn with_results(mut self, results: &'a HashMap<String, PortValues>) -> Self {
        self.results = Some(results);
        self
    }

    /// Declared node ids. A reference to a declared node that has no
    /// recorded output resolves to null instead of staying literal.
    pub fn with_declared(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        self.declared.extend(ids);
        self
    }

    pub fn with_context(mut self, view: &'a ContextView) -> Self {
        self.context = Some(view);
        self
    }

    /// Resolve every string inside `value`, recursing into arrays and objects.
    pub fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.resolve_str(s),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn resolve_map(&self, values: &HashMap<String, Value>) -> HashMap<String, Value> {
        values
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve(v)))
            .collect()
    }

    /// A string that is exactly one reference yields the referenced value
    /// with its type intact; embedded `${...}` forms are substituted as text.
    pub fn resolve_str(&self, text: &str) -> Value {
        if let Some(caps) = node_ref_pattern().captures(text) {
            let path = caps.get(2).map_or("", |m| m.as_str());
            return self
                .resolve_node_ref(&caps[1], path.trim_start_matches('.'))
                .unwrap_or_else(|| {
                    tracing::debug!(reference = text, "Reference to undeclared node left as written");
                    Value::from(text)
                });
        }

        let pattern = placeholder_pattern();
        if let Some(caps) = pattern.captures(text) {
            if caps[0].len() == text.len() {
                return self.resolve_placeholder(&caps[1]).unwrap_or_else(|| {
                    tracing::debug!(reference = text, "Unresolved placeholder left as written");
                    Value::from(text)
                });
            }
            let substituted = pattern.replace_all(text, |caps: &Captures| {
                self.resolve_placeholder(&caps[1])
                    .map(|v| v.to_display_string())
                    .unwrap_or_else(|| caps[0].to_string())
            });
            return Value::from(substituted.into_owned());
        }

        Value::from(text)
    }

    fn resolve_node_ref(&self, node: &str, path: &str) -> Option<Value> {
        let Some(outputs) = self.results.and_then(|r| r.get(node)) else {
            return self.declared.contains(node).then_some(Value::Null);
        };
        if path.is_empty() {
            return Some(Value::Object(outputs.clone()));
        }
        let mut segments = path.split('.');
        let port = segments.next().unwrap_or_default();
        let mut current = outputs.get(port).cloned().unwrap_or_default();
        for segment in segments {
            current = current.get(segment).cloned().unwrap_or_default();
        }
        Some(current)
    }

    fn resolve_placeholder(&self, expr: &str) -> Option<Value> {
        let (name, default) = match expr.split_once('|') {
            Some((name, default)) => (name.trim(), Some(default.trim())),
            None => (expr.trim(), None),
        };

        let found = if ContextPath::looks_like(name) {
            ContextPath::parse(name)
                .ok()
                .and_then(|path| self.context.and_then(|view| view.resolve(&path)))
        } else if let Some(key) = name.strip_prefix("input.") {
            self.lookup_input(key)
        } else if name == "timestamp" {
            Some(Value::from(Utc::now().to_rfc3339()))
        } else {
            self.environment
                .and_then(|env| env.get(name).cloned())
                .or_else(|| std::env::var(name).ok())
                .map(Value::from)
        };

        found.or_else(|| default.map(Value::from))
    }

    fn lookup_input(&self, key: &str) -> Option<Value> {
        let inputs = self.inputs?;
        if let Some(value) = inputs.get(key) {
            return Some(value.clone());
        }
        let mut segments = key.split('.');
        let mut current = inputs.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }
}
