use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Per-request header-like data carried under a reserved tag key.
pub type MetaData = HashMap<String, String>;

/// Generic runtime value for keys and tags supplied by callers.
///
/// Mirrors the JSON data model. Only the scalar variants are usable as
/// lookup keys; see [`IntoTagKey`](crate::key::IntoTagKey).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// JSON array.
    Array(Vec<Value>),
    /// JSON object. `BTreeMap` keeps rendering order deterministic.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// A value stored in a context's tag store.
///
/// Lookups hand out clones, so a caller never holds a reference into a
/// store guarded by another context's lock.
#[derive(Clone)]
pub enum TagValue {
    /// Plain dynamic value.
    Value(Value),
    /// Metadata sub-map stored under a reserved key.
    Metadata(MetaData),
    /// Arbitrary caller-owned payload. Cloning shares the `Arc`.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl TagValue {
    /// Wraps an arbitrary payload.
    #[must_use]
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Arc::new(value))
    }

    /// Returns the inner dynamic value, if this is a `Value`.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the metadata map, if this is a `Metadata` entry.
    #[must_use]
    pub fn as_metadata(&self) -> Option<&MetaData> {
        match self {
            Self::Metadata(m) => Some(m),
            _ => None,
        }
    }

    /// Downcasts an opaque payload to `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Opaque(any) => any.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Metadata(m) => f.debug_tuple("Metadata").field(m).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Metadata(a), Self::Metadata(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for TagValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        Self::Value(Value::from(v))
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        Self::Value(Value::String(v))
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        Self::Value(Value::Int(v))
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        Self::Value(Value::Bool(v))
    }
}

impl From<MetaData> for TagValue {
    fn from(m: MetaData) -> Self {
        Self::Metadata(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_values_compare_by_identity() {
        let a = TagValue::opaque(vec![1u8, 2, 3]);
        let b = a.clone();
        let c = TagValue::opaque(vec![1u8, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
        assert!(a.downcast_ref::<String>().is_none());
    }

    #[test]
    fn accessors_match_variant() {
        let v = TagValue::from("x");
        assert_eq!(v.as_value(), Some(&Value::String("x".to_string())));
        assert!(v.as_metadata().is_none());

        let mut meta = MetaData::new();
        meta.insert("a".to_string(), "1".to_string());
        let m = TagValue::from(meta.clone());
        assert_eq!(m.as_metadata(), Some(&meta));
        assert!(m.as_value().is_none());
    }

    #[test]
    fn value_kind_names() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::Float(1.5).kind(), "float");
        assert_eq!(Value::Array(vec![]).kind(), "array");
        assert_eq!(Value::Map(BTreeMap::new()).kind(), "map");
    }
}
