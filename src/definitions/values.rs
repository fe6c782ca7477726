//! Typed process variables and rule facts.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Named variables of a process instance or work item
pub type Variables = BTreeMap<String, VariableValue>;

/// A single typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum VariableValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<VariableValue>),
    Record(Record),
}

/// Domain object with a type name, such as a `Person` inserted as a fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub type_name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, VariableValue>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&VariableValue> {
        self.fields.get(field)
    }

    /// Whether every float in every field is finite
    pub fn is_finite(&self) -> bool {
        self.fields.values().all(VariableValue::is_finite)
    }
}

impl VariableValue {
    /// Short kind name used in validation messages
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Record(record) => &record.type_name,
        }
    }

    /// Whether every float inside the value is finite. NaN and infinities
    /// have no JSON form, so state holding them could not be read back.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(x) => x.is_finite(),
            Self::List(items) => items.iter().all(Self::is_finite),
            Self::Record(record) => record.is_finite(),
            _ => true,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Ordering between comparable values. Integers and floats compare
    /// numerically; lists and records only compare for equality.
    pub fn compare(&self, other: &VariableValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (a @ Self::List(_), b @ Self::List(_)) | (a @ Self::Record(_), b @ Self::Record(_)) => {
                (a == b).then_some(Ordering::Equal)
            }
            _ => None,
        }
    }

    /// Convert a literal written in a YAML definition document.
    ///
    /// Mappings and tagged values are not literals and yield `None`.
    pub fn from_yaml(value: &serde_yaml::Value) -> Option<Self> {
        match value {
            serde_yaml::Value::Null => Some(Self::Null),
            serde_yaml::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_yaml::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_yaml::Value::String(s) => Some(Self::Text(s.clone())),
            serde_yaml::Value::Sequence(items) => items
                .iter()
                .map(Self::from_yaml)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            serde_yaml::Value::Mapping(_) | serde_yaml::Value::Tagged(_) => None,
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Record(record) => write!(f, "{}{{..}}", record.type_name),
        }
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for VariableValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Record> for VariableValue {
    fn from(value: Record) -> Self {
        Self::Record(value)
    }
}

impl<T: Into<VariableValue>> From<Vec<T>> for VariableValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Declared kind of a process variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Bool,
    Integer,
    Float,
    Text,
    List,
    Any,
    /// Record of the named type
    Record(String),
}

impl VariableKind {
    /// Parse a kind written in a definition document. Unrecognised names are
    /// record type names.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        Some(match name {
            "bool" => Self::Bool,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "text" => Self::Text,
            "list" => Self::List,
            "any" => Self::Any,
            other => Self::Record(other.to_string()),
        })
    }

    /// Whether a value may be bound to a variable of this kind. `Null` is
    /// accepted everywhere; required variables are checked separately.
    pub fn accepts(&self, value: &VariableValue) -> bool {
        match (self, value) {
            (_, VariableValue::Null) | (Self::Any, _) => true,
            (Self::Bool, VariableValue::Bool(_)) => true,
            (Self::Integer, VariableValue::Integer(_)) => true,
            (Self::Float, VariableValue::Float(_) | VariableValue::Integer(_)) => true,
            (Self::Text, VariableValue::Text(_)) => true,
            (Self::List, VariableValue::List(_)) => true,
            (Self::Record(type_name), VariableValue::Record(record)) => {
                record.type_name == *type_name
            }
            _ => false,
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Text => write!(f, "text"),
            Self::List => write!(f, "list"),
            Self::Any => write!(f, "any"),
            Self::Record(name) => write!(f, "{name}"),
        }
    }
}
