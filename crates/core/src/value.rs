//! Field values of stored records
//!
//! `Value` is the record store's document value model:
//! Null, Bool, Int, Float, String, Bytes, Array, Object.
//!
//! Only a subset can be handed to the search engine. `Value::to_feed_text`
//! defines that subset:
//!
//! | value                         | feed text                |
//! |-------------------------------|--------------------------|
//! | `Null`                        | empty                    |
//! | `Bool`                        | `0` / `1`                |
//! | `Int`                         | decimal                  |
//! | `Float` (finite)              | shortest round-trip form |
//! | `String`                      | as is                    |
//! | `Array` of representable scalars | space-joined          |
//!
//! Everything else (`Bytes`, `Object`, nested arrays, NaN/infinite floats)
//! is rejected and the record carrying it is skipped by the feed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value of a single record field
///
/// Different types are never equal: `Int(1) != Float(1.0)`.
/// Float equality follows IEEE-754 (`NaN != NaN`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Array of values
    Array(Vec<Value>),
    /// Object with string keys
    Object(HashMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            _ => false,
        }
    }
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render this value as search-engine field text.
    ///
    /// Returns the reason as `Err` when the value has no representation.
    pub fn to_feed_text(&self) -> std::result::Result<String, String> {
        match self {
            Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    if matches!(item, Value::Array(_)) {
                        return Err("nested arrays are not representable".to_string());
                    }
                    parts.push(item.scalar_text()?);
                }
                Ok(parts.join(" "))
            }
            other => other.scalar_text(),
        }
    }

    fn scalar_text(&self) -> std::result::Result<String, String> {
        match self {
            Value::Null => Ok(String::new()),
            Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) if f.is_finite() => Ok(f.to_string()),
            Value::Float(f) => Err(format!("non-finite float {} is not representable", f)),
            Value::String(s) => match s.chars().find(|c| !is_xml_char(*c)) {
                Some(c) => Err(format!(
                    "character U+{:04X} is not allowed in XML text",
                    c as u32
                )),
                None => Ok(s.clone()),
            },
            other => Err(format!("{} values are not representable", other.type_name())),
        }
    }
}

/// XML 1.0 `Char` production
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
