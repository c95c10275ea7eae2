use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as JsonValue};

use crate::error::{EncodingError, EncodingErrorKind, FirestoreError, FirestoreResult};

/// The tagged-union JSON representation of a value on the wire.
///
/// Exactly one tag is populated per value. Tags this client does not know
/// (`bytesValue`, `geoPointValue`, future additions) are kept verbatim in
/// [`WireValue::Other`].
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    Null,
    Boolean(bool),
    /// Carried as decimal text on the wire so 64-bit values survive JSON.
    Integer(i64),
    Double(f64),
    String(String),
    /// RFC 3339 text.
    Timestamp(String),
    Reference(String),
    Array(Vec<WireValue>),
    Map(IndexMap<String, WireValue>),
    Other { tag: String, value: JsonValue },
}

impl WireValue {
    /// The JSON tag naming this variant (`"integerValue"`, `"mapValue"`, ...).
    pub fn tag(&self) -> &str {
        match self {
            WireValue::Null => "nullValue",
            WireValue::Boolean(_) => "booleanValue",
            WireValue::Integer(_) => "integerValue",
            WireValue::Double(_) => "doubleValue",
            WireValue::String(_) => "stringValue",
            WireValue::Timestamp(_) => "timestampValue",
            WireValue::Reference(_) => "referenceValue",
            WireValue::Array(_) => "arrayValue",
            WireValue::Map(_) => "mapValue",
            WireValue::Other { tag, .. } => tag,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            WireValue::Null => json!({ "nullValue": JsonValue::Null }),
            WireValue::Boolean(boolean) => json!({ "booleanValue": boolean }),
            WireValue::Integer(integer) => json!({ "integerValue": integer.to_string() }),
            WireValue::Double(double) => json!({ "doubleValue": encode_double(*double) }),
            WireValue::String(string) => json!({ "stringValue": string }),
            WireValue::Timestamp(timestamp) => json!({ "timestampValue": timestamp }),
            WireValue::Reference(reference) => json!({ "referenceValue": reference }),
            WireValue::Array(values) => {
                let values = values.iter().map(WireValue::to_json).collect::<Vec<_>>();
                json!({ "arrayValue": { "values": values } })
            }
            WireValue::Map(fields) => json!({
                "mapValue": {
                    "fields": fields_to_json(fields)
                }
            }),
            WireValue::Other { tag, value } => {
                let mut object = serde_json::Map::new();
                object.insert(tag.clone(), value.clone());
                JsonValue::Object(object)
            }
        }
    }

    pub fn from_json(value: &JsonValue) -> FirestoreResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| malformed("Expected Firestore value object"))?;
        let mut entries = object.iter();
        let (tag, inner) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (None, _) => return Err(malformed("Firestore value object has no tag")),
            (Some(_), Some(_)) => {
                return Err(malformed("Firestore value object must carry exactly one tag"))
            }
        };

        match tag.as_str() {
            "nullValue" => match inner {
                JsonValue::Null => Ok(WireValue::Null),
                JsonValue::String(text) if text == "NULL_VALUE" => Ok(WireValue::Null),
                _ => Err(malformed("nullValue must be null")),
            },
            "booleanValue" => inner
                .as_bool()
                .map(WireValue::Boolean)
                .ok_or_else(|| malformed("booleanValue must be bool")),
            "integerValue" => match inner {
                JsonValue::String(text) => text
                    .parse::<i64>()
                    .map(WireValue::Integer)
                    .map_err(|err| malformed(format!("Invalid integerValue: {err}"))),
                JsonValue::Number(number) => number
                    .as_i64()
                    .map(WireValue::Integer)
                    .ok_or_else(|| malformed("Integer out of range")),
                _ => Err(malformed("integerValue must be a string or number")),
            },
            "doubleValue" => decode_double(inner).map(WireValue::Double),
            "stringValue" => inner
                .as_str()
                .map(|text| WireValue::String(text.to_string()))
                .ok_or_else(|| malformed("stringValue must be string")),
            "timestampValue" => inner
                .as_str()
                .map(|text| WireValue::Timestamp(text.to_string()))
                .ok_or_else(|| malformed("timestampValue must be string")),
            "referenceValue" => inner
                .as_str()
                .map(|text| WireValue::Reference(text.to_string()))
                .ok_or_else(|| malformed("referenceValue must be string")),
            "arrayValue" => {
                let values = match inner.get("values") {
                    Some(JsonValue::Array(entries)) => entries
                        .iter()
                        .map(WireValue::from_json)
                        .collect::<FirestoreResult<Vec<_>>>()?,
                    Some(JsonValue::Null) | None => Vec::new(),
                    Some(_) => return Err(malformed("arrayValue.values must be an array")),
                };
                Ok(WireValue::Array(values))
            }
            "mapValue" => match inner.get("fields") {
                Some(fields) => fields_from_json(fields).map(WireValue::Map),
                None => Ok(WireValue::Map(IndexMap::new())),
            },
            other => Ok(WireValue::Other {
                tag: other.to_string(),
                value: inner.clone(),
            }),
        }
    }
}

/// Encodes a `fields` object (`{"name": <WireValue>, ...}`).
pub fn fields_to_json(fields: &IndexMap<String, WireValue>) -> JsonValue {
    let mut object = serde_json::Map::new();
    for (key, value) in fields {
        object.insert(key.clone(), value.to_json());
    }
    JsonValue::Object(object)
}

/// Decodes a `fields` object; `null` is treated as an empty map.
pub fn fields_from_json(value: &JsonValue) -> FirestoreResult<IndexMap<String, WireValue>> {
    match value {
        JsonValue::Null => Ok(IndexMap::new()),
        JsonValue::Object(object) => object
            .iter()
            .map(|(key, value)| Ok((key.clone(), WireValue::from_json(value)?)))
            .collect(),
        _ => Err(malformed("Expected 'fields' to be an object")),
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        WireValue::from_json(&json).map_err(D::Error::custom)
    }
}

fn encode_double(value: f64) -> JsonValue {
    if value.is_nan() {
        json!("NaN")
    } else if value == f64::INFINITY {
        json!("Infinity")
    } else if value == f64::NEG_INFINITY {
        json!("-Infinity")
    } else {
        json!(value)
    }
}

fn decode_double(value: &JsonValue) -> FirestoreResult<f64> {
    match value {
        JsonValue::Number(number) => number
            .as_f64()
            .ok_or_else(|| malformed("Invalid doubleValue")),
        JsonValue::String(text) => match text.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other
                .parse::<f64>()
                .map_err(|err| malformed(format!("Invalid doubleValue: {err}"))),
        },
        _ => Err(malformed("doubleValue must be a number or string")),
    }
}

fn malformed(message: impl Into<String>) -> FirestoreError {
    EncodingError::new(EncodingErrorKind::InvalidValue, message)
        .with_value_type("WireValue")
        .into()
}
