use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{invalid_value, FirestoreResult};
use crate::model::Timestamp;
use crate::value::{ArrayValue, FirestoreValue, MapValue, ValueKind};

/// Conversion of caller-defined types into a [`FirestoreValue`].
///
/// Implement this for your own types to pass them straight to document and
/// batch writes. Types that already implement `serde::Serialize` can use
/// [`FirestoreValue::from_serializable`] instead.
pub trait IntoFirestoreValue {
    fn into_firestore_value(self) -> FirestoreValue;
}

macro_rules! into_value_via_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoFirestoreValue for $ty {
                fn into_firestore_value(self) -> FirestoreValue {
                    FirestoreValue::from(self)
                }
            }
        )*
    };
}

into_value_via_from!(
    FirestoreValue,
    bool,
    i32,
    i64,
    u32,
    f64,
    &str,
    String,
    Timestamp,
    ArrayValue,
    MapValue,
);

impl IntoFirestoreValue for f32 {
    fn into_firestore_value(self) -> FirestoreValue {
        FirestoreValue::from_double(self.into())
    }
}

impl IntoFirestoreValue for &String {
    fn into_firestore_value(self) -> FirestoreValue {
        FirestoreValue::from_string(self.as_str())
    }
}

impl<Tz: TimeZone> IntoFirestoreValue for DateTime<Tz> {
    fn into_firestore_value(self) -> FirestoreValue {
        FirestoreValue::from_datetime(&self)
    }
}

impl IntoFirestoreValue for JsonValue {
    fn into_firestore_value(self) -> FirestoreValue {
        FirestoreValue::from_json(&self)
    }
}

impl<T: IntoFirestoreValue> IntoFirestoreValue for Option<T> {
    fn into_firestore_value(self) -> FirestoreValue {
        match self {
            Some(value) => value.into_firestore_value(),
            None => FirestoreValue::null(),
        }
    }
}

impl<T: IntoFirestoreValue> IntoFirestoreValue for Vec<T> {
    fn into_firestore_value(self) -> FirestoreValue {
        FirestoreValue::from_array(
            self.into_iter()
                .map(IntoFirestoreValue::into_firestore_value)
                .collect(),
        )
    }
}

impl<K: Into<String>, T: IntoFirestoreValue> IntoFirestoreValue for IndexMap<K, T> {
    fn into_firestore_value(self) -> FirestoreValue {
        FirestoreValue::from_map(collect_fields(self))
    }
}

impl<K: Into<String>, T: IntoFirestoreValue> IntoFirestoreValue for BTreeMap<K, T> {
    fn into_firestore_value(self) -> FirestoreValue {
        FirestoreValue::from_map(collect_fields(self))
    }
}

impl<K: Into<String>, T: IntoFirestoreValue, S> IntoFirestoreValue for HashMap<K, T, S> {
    fn into_firestore_value(self) -> FirestoreValue {
        FirestoreValue::from_map(collect_fields(self))
    }
}

fn collect_fields<K, T, I>(entries: I) -> MapValue
where
    K: Into<String>,
    T: IntoFirestoreValue,
    I: IntoIterator<Item = (K, T)>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key, value.into_firestore_value()))
        .collect()
}

impl FirestoreValue {
    /// Converts loosely-typed JSON.
    ///
    /// Objects whose keys are exactly `"0"` to `"n-1"` (in any order) become
    /// arrays ordered by index; every other object becomes a map. The rule is
    /// applied independently at each nesting level.
    pub fn from_json(value: &JsonValue) -> FirestoreValue {
        match value {
            JsonValue::Null => FirestoreValue::null(),
            JsonValue::Bool(boolean) => FirestoreValue::from_bool(*boolean),
            JsonValue::Number(number) => match number.as_i64() {
                Some(integer) => FirestoreValue::from_integer(integer),
                None => FirestoreValue::from_double(number.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(text) => FirestoreValue::from_string(text.as_str()),
            JsonValue::Array(values) => {
                FirestoreValue::from_array(values.iter().map(FirestoreValue::from_json).collect())
            }
            JsonValue::Object(object) => match dense_entries(object) {
                Some(values) => FirestoreValue::from_array(
                    values.into_iter().map(FirestoreValue::from_json).collect(),
                ),
                None => FirestoreValue::from_map(
                    object
                        .iter()
                        .map(|(key, value)| (key.as_str(), FirestoreValue::from_json(value)))
                        .collect::<MapValue>(),
                ),
            },
        }
    }

    /// Expands any `serde` serializable value and converts the result with
    /// [`FirestoreValue::from_json`].
    ///
    /// Entries that fail to serialize are not dropped: any failure, even in a
    /// single nested field, rejects the whole value with
    /// [`EncodingErrorKind::InvalidValue`](crate::error::EncodingErrorKind::InvalidValue).
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> FirestoreResult<FirestoreValue> {
        serde_json::to_value(value)
            .map(|json| FirestoreValue::from_json(&json))
            .map_err(|err| {
                log::debug!("serialization failed: {err}");
                invalid_value(std::any::type_name::<T>())
            })
    }

    /// Last-resort conversion through the value's `Display` text.
    pub fn from_display<T: Display + ?Sized>(value: &T) -> FirestoreValue {
        FirestoreValue::from_string(value.to_string())
    }

    /// Plain JSON rendering: integers as numbers, timestamps as RFC 3339 text,
    /// references as their path.
    pub fn to_json(&self) -> JsonValue {
        match self.kind() {
            ValueKind::Null => JsonValue::Null,
            ValueKind::Boolean(boolean) => JsonValue::Bool(*boolean),
            ValueKind::Integer(integer) => JsonValue::from(*integer),
            ValueKind::Double(double) => serde_json::Number::from_f64(*double)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(double.to_string())),
            ValueKind::String(text) | ValueKind::Reference(text) => JsonValue::String(text.clone()),
            ValueKind::Timestamp(timestamp) => JsonValue::String(timestamp.to_string()),
            ValueKind::Array(array) => {
                JsonValue::Array(array.values().iter().map(FirestoreValue::to_json).collect())
            }
            ValueKind::Map(map) => JsonValue::Object(
                map.fields()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl MapValue {
    /// Serializes a struct or map into document fields.
    ///
    /// Fails as a whole when any field cannot be serialized; nothing is
    /// silently left out.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> FirestoreResult<MapValue> {
        match FirestoreValue::from_serializable(value)?.into_kind() {
            ValueKind::Map(map) => Ok(map),
            _ => Err(invalid_value(std::any::type_name::<T>())),
        }
    }

    /// Renders the fields as a plain JSON object.
    pub fn to_json(&self) -> JsonValue {
        FirestoreValue::from(self.clone()).to_json()
    }
}

/// Returns the values ordered by index when the keys are exactly `0..n`.
fn dense_entries(object: &JsonMap<String, JsonValue>) -> Option<Vec<&JsonValue>> {
    if object.is_empty() {
        return None;
    }
    let mut slots: Vec<Option<&JsonValue>> = vec![None; object.len()];
    for (key, value) in object {
        let index = parse_index(key)?;
        let slot = slots.get_mut(index)?;
        *slot = Some(value);
    }
    slots.into_iter().collect()
}

fn parse_index(key: &str) -> Option<usize> {
    let canonical = !key.is_empty()
        && key.bytes().all(|byte| byte.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'));
    if canonical {
        key.parse().ok()
    } else {
        None
    }
}
