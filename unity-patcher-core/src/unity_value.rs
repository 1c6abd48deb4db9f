//! Unity value types
//!
//! `UnityValue` is the decoded field tree of a serialized Unity object.
//! Objects keep field order (IndexMap) because the binary layout is
//! positional and a re-serialized object must match its typetree.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value inside an object's field tree
///
/// `Bytes` is declared last so untagged deserialization never produces it;
/// byte blobs only come from the binary reader or from decoded dump strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnityValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<UnityValue>),
    Object(IndexMap<String, UnityValue>),
    Bytes(Vec<u8>),
}

impl UnityValue {
    /// Empty object
    pub fn object() -> Self {
        UnityValue::Object(IndexMap::new())
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, UnityValue::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            UnityValue::Bool(b) => Some(*b),
            UnityValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            UnityValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer view that also accepts booleans and integral floats.
    ///
    /// JSON dumps edited by hand often turn `1` into `1.0`.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            UnityValue::Integer(i) => Some(*i),
            UnityValue::Bool(b) => Some(*b as i64),
            UnityValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Get as float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            UnityValue::Float(f) => Some(*f),
            UnityValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            UnityValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&Vec<UnityValue>> {
        match self {
            UnityValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object
    pub fn as_object(&self) -> Option<&IndexMap<String, UnityValue>> {
        match self {
            UnityValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get mutable reference as object
    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, UnityValue>> {
        match self {
            UnityValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Borrow raw bytes (blobs or byte strings)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            UnityValue::Bytes(b) => Some(b),
            UnityValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Collect bytes from a blob, a string, or an array of small integers
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            UnityValue::Bytes(b) => Some(b.clone()),
            UnityValue::String(s) => Some(s.as_bytes().to_vec()),
            UnityValue::Array(items) => items
                .iter()
                .map(|v| v.to_i64().and_then(|i| u8::try_from(i).ok()))
                .collect(),
            _ => None,
        }
    }

    /// Field lookup on an object value
    pub fn get(&self, key: &str) -> Option<&UnityValue> {
        self.as_object().and_then(|obj| obj.get(key))
    }

    /// Mutable field lookup on an object value
    pub fn get_mut(&mut self, key: &str) -> Option<&mut UnityValue> {
        self.as_object_mut().and_then(|obj| obj.get_mut(key))
    }

    /// Whether an object value has the field
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a field on an object value, returning the previous value.
    /// Non-object values are left untouched.
    pub fn insert<V: Into<UnityValue>>(&mut self, key: &str, value: V) -> Option<UnityValue> {
        self.as_object_mut()
            .and_then(|obj| obj.insert(key.to_string(), value.into()))
    }

    /// Follow a path of field names
    pub fn path(&self, keys: &[&str]) -> Option<&UnityValue> {
        keys.iter().try_fold(self, |value, key| value.get(key))
    }

    /// Overlay `other` onto `self`.
    ///
    /// Objects merge field by field; every other value replaces the
    /// existing one. Fields absent from `other` keep their current value.
    pub fn merge(&mut self, other: UnityValue) {
        match (self, other) {
            (UnityValue::Object(base), UnityValue::Object(patch)) => {
                for (key, value) in patch {
                    match base.get_mut(&key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
            }
            (slot, value) => *slot = value,
        }
    }

    /// Short name of the variant, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            UnityValue::Null => "null",
            UnityValue::Bool(_) => "bool",
            UnityValue::Integer(_) => "integer",
            UnityValue::Float(_) => "float",
            UnityValue::String(_) => "string",
            UnityValue::Array(_) => "array",
            UnityValue::Object(_) => "object",
            UnityValue::Bytes(_) => "bytes",
        }
    }
}

impl Default for UnityValue {
    fn default() -> Self {
        UnityValue::Null
    }
}

impl fmt::Display for UnityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnityValue::Null => write!(f, "null"),
            UnityValue::Bool(b) => write!(f, "{}", b),
            UnityValue::Integer(i) => write!(f, "{}", i),
            UnityValue::Float(fl) => write!(f, "{}", fl),
            UnityValue::String(s) => write!(f, "{}", s),
            UnityValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            UnityValue::Array(arr) => {
                write!(f, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            UnityValue::Object(obj) => {
                write!(f, "{{")?;
                for (i, (key, value)) in obj.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// Conversion implementations
impl From<bool> for UnityValue {
    fn from(b: bool) -> Self {
        UnityValue::Bool(b)
    }
}

impl From<i32> for UnityValue {
    fn from(i: i32) -> Self {
        UnityValue::Integer(i as i64)
    }
}

impl From<u32> for UnityValue {
    fn from(i: u32) -> Self {
        UnityValue::Integer(i as i64)
    }
}

impl From<i64> for UnityValue {
    fn from(i: i64) -> Self {
        UnityValue::Integer(i)
    }
}

impl From<usize> for UnityValue {
    fn from(i: usize) -> Self {
        UnityValue::Integer(i as i64)
    }
}

impl From<f32> for UnityValue {
    fn from(f: f32) -> Self {
        UnityValue::Float(f as f64)
    }
}

impl From<f64> for UnityValue {
    fn from(f: f64) -> Self {
        UnityValue::Float(f)
    }
}

impl From<String> for UnityValue {
    fn from(s: String) -> Self {
        UnityValue::String(s)
    }
}

impl From<&str> for UnityValue {
    fn from(s: &str) -> Self {
        UnityValue::String(s.to_string())
    }
}

impl From<Vec<u8>> for UnityValue {
    fn from(bytes: Vec<u8>) -> Self {
        UnityValue::Bytes(bytes)
    }
}

impl From<Vec<UnityValue>> for UnityValue {
    fn from(arr: Vec<UnityValue>) -> Self {
        UnityValue::Array(arr)
    }
}

impl From<IndexMap<String, UnityValue>> for UnityValue {
    fn from(obj: IndexMap<String, UnityValue>) -> Self {
        UnityValue::Object(obj)
    }
}
