use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared kind of data a port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Text,
    Number,
    Boolean,
    Json,
    Array,
    Binary,
    Image,
    Audio,
    Video,
    File,
    Any,
}

impl DataKind {
    /// Kind check for a present, non-null value.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (DataKind::Any, _) => true,
            (DataKind::Text, Value::String(_)) => true,
            (DataKind::Number, Value::Number(_)) => true,
            (DataKind::Boolean, Value::Bool(_)) => true,
            (DataKind::Json, Value::Object(_) | Value::Array(_)) => true,
            (DataKind::Array, Value::Array(_)) => true,
            // Media may arrive as raw bytes or as a path / encoded string.
            (
                DataKind::Binary | DataKind::Image | DataKind::Audio | DataKind::Video | DataKind::File,
                Value::Bytes(_) | Value::String(_),
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataKind::Text => "text",
            DataKind::Number => "number",
            DataKind::Boolean => "boolean",
            DataKind::Json => "json",
            DataKind::Array => "array",
            DataKind::Binary => "binary",
            DataKind::Image => "image",
            DataKind::Audio => "audio",
            DataKind::Video => "video",
            DataKind::File => "file",
            DataKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// A named, typed slot on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub data_kind: DataKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub description: String,
}

impl Port {
    /// Required input port.
    pub fn input(name: impl Into<String>, data_kind: DataKind) -> Self {
        Self {
            name: name.into(),
            data_kind,
            required: true,
            default_value: None,
            description: String::new(),
        }
    }

    /// Output port. Outputs are never required.
    pub fn output(name: impl Into<String>, data_kind: DataKind) -> Self {
        Self {
            required: false,
            ..Self::input(name, data_kind)
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Pass/fail signal for a supplied value. `None` and `Null` count as absent:
    /// they fail only when the port is required and has no default.
    pub fn validate(&self, value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => !self.required || self.default_value.is_some(),
            Some(v) => self.data_kind.accepts(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_without_default_fails_when_absent() {
        let port = Port::input("value", DataKind::Any);
        assert!(!port.validate(None));
        assert!(!port.validate(Some(&Value::Null)));
        assert!(port.validate(Some(&Value::from(1.0))));
    }

    #[test]
    fn default_or_optional_passes_when_absent() {
        assert!(Port::input("a", DataKind::Text).with_default("x").validate(None));
        assert!(Port::input("b", DataKind::Text).optional().validate(None));
    }

    #[test]
    fn any_accepts_everything() {
        let port = Port::input("anything", DataKind::Any);
        for value in [
            Value::Bool(false),
            Value::from("s"),
            Value::Bytes(vec![1, 2]),
            Value::Array(vec![]),
        ] {
            assert!(port.validate(Some(&value)));
        }
    }

    #[test]
    fn kind_mismatch_fails() {
        let port = Port::input("condition", DataKind::Boolean);
        assert!(!port.validate(Some(&Value::from("true"))));
        assert!(Port::input("doc", DataKind::Json).validate(Some(&Value::Array(vec![]))));
        assert!(Port::input("img", DataKind::Image).validate(Some(&Value::from("cat.png"))));
    }

    #[test]
    fn kinds_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&DataKind::Image).unwrap(), "\"image\"");
        assert_eq!(DataKind::Any.to_string(), "any");
    }
}
