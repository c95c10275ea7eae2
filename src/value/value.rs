use chrono::{DateTime, TimeZone};
use indexmap::IndexMap;

use crate::model::Timestamp;
use crate::value::{ArrayValue, MapValue};

/// A native document value: the caller-facing side of the codec.
#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreValue {
    kind: ValueKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(Timestamp),
    Reference(String),
    Array(ArrayValue),
    Map(MapValue),
}

impl FirestoreValue {
    pub fn null() -> Self {
        Self {
            kind: ValueKind::Null,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean(value),
        }
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            kind: ValueKind::Integer(value),
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self {
            kind: ValueKind::Double(value),
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(value.into()),
        }
    }

    pub fn from_timestamp(value: Timestamp) -> Self {
        Self {
            kind: ValueKind::Timestamp(value),
        }
    }

    pub fn from_datetime<Tz: TimeZone>(value: &DateTime<Tz>) -> Self {
        Self::from_timestamp(Timestamp::from_datetime(value))
    }

    /// A reference to another document, given as its fully-qualified path.
    pub fn from_reference(path: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Reference(path.into()),
        }
    }

    /// An ordered list.
    pub fn from_array(values: Vec<FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Array(ArrayValue::new(values)),
        }
    }

    /// A map of named fields.
    pub fn from_map(map: impl Into<MapValue>) -> Self {
        Self {
            kind: ValueKind::Map(map.into()),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn into_kind(self) -> ValueKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ValueKind::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.kind {
            ValueKind::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.kind {
            ValueKind::Double(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self.kind {
            ValueKind::Timestamp(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match &self.kind {
            ValueKind::Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match &self.kind {
            ValueKind::Map(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for FirestoreValue {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl From<i32> for FirestoreValue {
    fn from(value: i32) -> Self {
        Self::from_integer(value.into())
    }
}

impl From<i64> for FirestoreValue {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl From<u32> for FirestoreValue {
    fn from(value: u32) -> Self {
        Self::from_integer(value.into())
    }
}

impl From<f64> for FirestoreValue {
    fn from(value: f64) -> Self {
        Self::from_double(value)
    }
}

impl From<&str> for FirestoreValue {
    fn from(value: &str) -> Self {
        Self::from_string(value)
    }
}

impl From<String> for FirestoreValue {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl From<Timestamp> for FirestoreValue {
    fn from(value: Timestamp) -> Self {
        Self::from_timestamp(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for FirestoreValue {
    fn from(value: DateTime<Tz>) -> Self {
        Self::from_datetime(&value)
    }
}

impl From<Vec<FirestoreValue>> for FirestoreValue {
    fn from(values: Vec<FirestoreValue>) -> Self {
        Self::from_array(values)
    }
}

impl From<ArrayValue> for FirestoreValue {
    fn from(value: ArrayValue) -> Self {
        Self {
            kind: ValueKind::Array(value),
        }
    }
}

impl From<MapValue> for FirestoreValue {
    fn from(value: MapValue) -> Self {
        Self::from_map(value)
    }
}

impl From<IndexMap<String, FirestoreValue>> for FirestoreValue {
    fn from(value: IndexMap<String, FirestoreValue>) -> Self {
        Self::from_map(value)
    }
}

impl<T: Into<FirestoreValue>> From<Option<T>> for FirestoreValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(Self::null)
    }
}
