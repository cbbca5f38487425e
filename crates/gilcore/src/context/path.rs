//! Typed context paths.
//!
//! A path names one slot of the workflow or node context, e.g.
//! `flow_context.variables.user_id` or `${node_context.errors.length}`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextScope {
    Flow,
    Node,
}

impl ContextScope {
    fn prefix(&self) -> &'static str {
        match self {
            ContextScope::Flow => "flow_context",
            ContextScope::Node => "node_context",
        }
    }

    /// Shared data lives only on the workflow, internal state only on a node.
    pub fn has_section(&self, section: ContextSection) -> bool {
        !matches!(
            (self, section),
            (ContextScope::Flow, ContextSection::InternalState)
                | (ContextScope::Node, ContextSection::SharedData)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSection {
    Variables,
    SharedData,
    Errors,
    Metadata,
    /// Node scope only.
    InternalState,
}

impl ContextSection {
    fn name(&self) -> &'static str {
        match self {
            ContextSection::Variables => "variables",
            ContextSection::SharedData => "shared_data",
            ContextSection::Errors => "errors",
            ContextSection::Metadata => "metadata",
            ContextSection::InternalState => "internal_state",
        }
    }

    /// Sections that can be written by propagation.
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            ContextSection::Variables | ContextSection::SharedData | ContextSection::Metadata
        )
    }
}

impl FromStr for ContextSection {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variables" => Ok(ContextSection::Variables),
            "shared_data" => Ok(ContextSection::SharedData),
            "errors" => Ok(ContextSection::Errors),
            "metadata" => Ok(ContextSection::Metadata),
            "internal_state" => Ok(ContextSection::InternalState),
            other => Err(PathError::UnknownSection(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("empty context path")]
    Empty,

    #[error("unknown context scope '{0}'")]
    UnknownScope(String),

    #[error("unknown context section '{0}'")]
    UnknownSection(String),

    #[error("section '{section}' is not available in {scope}")]
    SectionNotInScope { scope: String, section: String },

    #[error("context path '{0}' has no section")]
    MissingSection(String),

    #[error("section '{0}' cannot be written")]
    ReadOnlySection(String),

    #[error("context target '{0}' needs a key")]
    MissingKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPath {
    pub scope: ContextScope,
    pub section: ContextSection,
    /// Remaining dotted key, kept whole (`a.b` stays `a.b`).
    pub key: Option<String>,
}

impl ContextPath {
    /// Parse a read path. Accepts an optional `${ ... }` wrapper.
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let inner = strip_wrapper(expr.trim());
        if inner.is_empty() {
            return Err(PathError::Empty);
        }

        let mut parts = inner.splitn(3, '.');
        let scope = match parts.next() {
            Some("flow_context") => ContextScope::Flow,
            Some("node_context") => ContextScope::Node,
            Some(other) => return Err(PathError::UnknownScope(other.to_string())),
            None => return Err(PathError::Empty),
        };
        let section: ContextSection = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PathError::MissingSection(inner.to_string()))?
            .parse()?;

        if !scope.has_section(section) {
            return Err(PathError::SectionNotInScope {
                scope: scope.prefix().to_string(),
                section: section.name().to_string(),
            });
        }

        let key = parts.next().filter(|k| !k.is_empty()).map(str::to_string);
        Ok(Self {
            scope,
            section,
            key,
        })
    }

    /// Parse a propagation target such as `variables.user_count`.
    /// Targets always address the workflow context.
    pub fn parse_target(target: &str) -> Result<Self, PathError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(PathError::Empty);
        }
        let (section, key) = target
            .split_once('.')
            .ok_or_else(|| PathError::MissingKey(target.to_string()))?;
        let section: ContextSection = section.parse()?;
        if !section.is_writable() {
            return Err(PathError::ReadOnlySection(section.name().to_string()));
        }
        if key.is_empty() {
            return Err(PathError::MissingKey(target.to_string()));
        }
        Ok(Self {
            scope: ContextScope::Flow,
            section,
            key: Some(key.to_string()),
        })
    }

    /// True when the expression is shaped like a context path at all.
    pub fn looks_like(expr: &str) -> bool {
        let inner = strip_wrapper(expr.trim());
        inner.starts_with("flow_context.") || inner.starts_with("node_context.")
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope.prefix(), self.section.name())?;
        if let Some(key) = &self.key {
            write!(f, ".{}", key)?;
        }
        Ok(())
    }
}

fn strip_wrapper(expr: &str) -> &str {
    expr.strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(expr)
}
