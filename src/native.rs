//! Native input data, before it has a CTY type.
//!
//! This is the host-side shape that `validate` consumes. It is deliberately
//! looser than `Value`: map keys need not be strings, numbers come in several
//! representations, and already-typed values may be mixed in anywhere.
use std::collections::BTreeMap;

use crate::types::CapsuleHandle;
use crate::value::{Number, Value};

#[derive(Clone, Debug)]
pub enum Native {
    /// No value at all; validates to null of the target type.
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Number(Number),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Native>),
    Tuple(Vec<Native>),
    Set(Vec<Native>),
    Map(Vec<(Native, Native)>),
    Value(Value),
    Capsule(CapsuleHandle),
}

impl Native {
    /// Host type name, used in diagnostics instead of the value itself.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Native::Absent => "NoneType",
            Native::Bool(_) => "bool",
            Native::Int(_) => "int",
            Native::Float(_) => "float",
            Native::Number(_) => "Decimal",
            Native::String(_) => "str",
            Native::Bytes(_) => "bytes",
            Native::List(_) => "list",
            Native::Tuple(_) => "tuple",
            Native::Set(_) => "set",
            Native::Map(_) => "dict",
            Native::Value(_) => "CtyValue",
            Native::Capsule(_) => "capsule",
        }
    }

    /// String-keyed map from any iterable of pairs.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Native>,
    {
        Native::Map(entries.into_iter().map(|(k, v)| (Native::String(k.into()), v.into())).collect())
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Native>,
    {
        Native::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Native::Absent)
    }

    /// The key as a string, when it is one.
    pub(crate) fn as_key(&self) -> Option<&str> {
        match self {
            Native::String(s) => Some(s),
            Native::Value(v) => v.as_str(),
            _ => None,
        }
    }
}

// ------------------------------- From impls ------------------------------- //

impl From<serde_json::Value> for Native {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Native::Absent,
            serde_json::Value::Bool(b) => Native::Bool(b),
            // the engine applies its own exponent bound when validating
            serde_json::Value::Number(n) => match Number::parse_bounded(&n.to_string(), u32::MAX) {
                Ok(num) => Native::Number(num),
                Err(_) => Native::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Native::String(s),
            serde_json::Value::Array(items) => Native::List(items.into_iter().map(Native::from).collect()),
            serde_json::Value::Object(map) => {
                Native::Map(map.into_iter().map(|(k, v)| (Native::String(k), Native::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Native {
    fn from(b: bool) -> Self { Native::Bool(b) }
}

impl From<i64> for Native {
    fn from(i: i64) -> Self { Native::Int(i) }
}

impl From<i32> for Native {
    fn from(i: i32) -> Self { Native::Int(i64::from(i)) }
}

impl From<f64> for Native {
    fn from(f: f64) -> Self { Native::Float(f) }
}

impl From<Number> for Native {
    fn from(n: Number) -> Self { Native::Number(n) }
}

impl From<&str> for Native {
    fn from(s: &str) -> Self { Native::String(s.to_string()) }
}

impl From<String> for Native {
    fn from(s: String) -> Self { Native::String(s) }
}

impl From<Value> for Native {
    fn from(v: Value) -> Self { Native::Value(v) }
}

impl From<CapsuleHandle> for Native {
    fn from(h: CapsuleHandle) -> Self { Native::Capsule(h) }
}

impl<T: Into<Native>> From<Option<T>> for Native {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Native::Absent)
    }
}

impl<T: Into<Native>> From<Vec<T>> for Native {
    fn from(items: Vec<T>) -> Self {
        Native::list(items)
    }
}

impl<K: Into<String>, V: Into<Native>> From<BTreeMap<K, V>> for Native {
    fn from(m: BTreeMap<K, V>) -> Self {
        Native::map(m)
    }
}
