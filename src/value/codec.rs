use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};

use crate::error::{invalid_value, FirestoreResult};
use crate::model::Timestamp;
use crate::value::wire::{fields_from_json, fields_to_json};
use crate::value::{FirestoreValue, MapValue, ValueKind, WireValue};

const GEO_GEOMETRY_KEY: &str = "geometry";
const GEO_DISTANCE_KEY: &str = "distance";

/// Converts between [`FirestoreValue`] and [`WireValue`].
///
/// The encoder is stateless apart from its options and can be shared freely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValueEncoder {
    geo_shape_strings: bool,
}

impl ValueEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes maps carrying both a `geometry` and a `distance` key as a
    /// `stringValue` holding their JSON text instead of a `mapValue`.
    pub fn with_geo_shape_strings(mut self) -> Self {
        self.geo_shape_strings = true;
        self
    }

    pub fn geo_shape_strings(&self) -> bool {
        self.geo_shape_strings
    }

    pub fn encode(&self, value: &FirestoreValue) -> FirestoreResult<WireValue> {
        Ok(match value.kind() {
            ValueKind::Null => WireValue::Null,
            ValueKind::Boolean(boolean) => WireValue::Boolean(*boolean),
            ValueKind::Integer(integer) => WireValue::Integer(*integer),
            ValueKind::Double(double) => WireValue::Double(*double),
            ValueKind::String(string) => WireValue::String(string.clone()),
            ValueKind::Timestamp(timestamp) => WireValue::Timestamp(timestamp.to_rfc3339()?),
            ValueKind::Reference(reference) => WireValue::Reference(reference.clone()),
            ValueKind::Array(array) => WireValue::Array(
                array
                    .values()
                    .iter()
                    .map(|value| self.encode(value))
                    .collect::<FirestoreResult<Vec<_>>>()?,
            ),
            ValueKind::Map(map) if self.is_geo_shape(map) => {
                let text = serde_json::to_string(&FirestoreValue::from(map.clone()).to_json())
                    .map_err(|_| invalid_value("geo shape"))?;
                WireValue::String(text)
            }
            ValueKind::Map(map) => WireValue::Map(self.encode_fields(map)?),
        })
    }

    /// Encodes every field of `map`, keeping field order.
    pub fn encode_fields(&self, map: &MapValue) -> FirestoreResult<IndexMap<String, WireValue>> {
        map.fields()
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.encode(value)?)))
            .collect()
    }

    /// Encodes `map` as a document body: `{"fields": {...}}`.
    pub fn encode_document(&self, map: &MapValue) -> FirestoreResult<JsonValue> {
        Ok(json!({ "fields": fields_to_json(&self.encode_fields(map)?) }))
    }

    pub fn decode(&self, value: &WireValue) -> FirestoreResult<FirestoreValue> {
        Ok(match value {
            WireValue::Null => FirestoreValue::null(),
            WireValue::Boolean(boolean) => FirestoreValue::from_bool(*boolean),
            WireValue::Integer(integer) => FirestoreValue::from_integer(*integer),
            WireValue::Double(double) => FirestoreValue::from_double(*double),
            WireValue::String(string) => FirestoreValue::from_string(string.clone()),
            WireValue::Timestamp(text) => {
                FirestoreValue::from_timestamp(Timestamp::parse_rfc3339(text)?)
            }
            WireValue::Reference(reference) => FirestoreValue::from_reference(reference.clone()),
            WireValue::Array(values) => FirestoreValue::from_array(
                values
                    .iter()
                    .map(|value| self.decode(value))
                    .collect::<FirestoreResult<Vec<_>>>()?,
            ),
            WireValue::Map(fields) => FirestoreValue::from_map(self.decode_fields(fields)?),
            WireValue::Other { tag, value } => {
                log::debug!("passing through unrecognised value tag {tag}");
                FirestoreValue::from_json(value)
            }
        })
    }

    pub fn decode_fields(&self, fields: &IndexMap<String, WireValue>) -> FirestoreResult<MapValue> {
        fields
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.decode(value)?)))
            .collect()
    }

    /// Decodes the `fields` of a document resource. A document without user
    /// fields decodes to an empty map.
    pub fn decode_document(&self, document: &JsonValue) -> FirestoreResult<MapValue> {
        match document.get("fields") {
            Some(fields) => self.decode_fields(&fields_from_json(fields)?),
            None => Ok(MapValue::default()),
        }
    }

    /// Encodes straight to the JSON wire shape.
    pub fn encode_json(&self, value: &FirestoreValue) -> FirestoreResult<JsonValue> {
        self.encode(value).map(|wire| wire.to_json())
    }

    /// Decodes from the JSON wire shape.
    pub fn decode_json(&self, value: &JsonValue) -> FirestoreResult<FirestoreValue> {
        self.decode(&WireValue::from_json(value)?)
    }

    fn is_geo_shape(&self, map: &MapValue) -> bool {
        self.geo_shape_strings
            && map.get(GEO_GEOMETRY_KEY).is_some()
            && map.get(GEO_DISTANCE_KEY).is_some()
    }
}

/// Encodes with the default options.
pub fn encode_value(value: &FirestoreValue) -> FirestoreResult<WireValue> {
    ValueEncoder::default().encode(value)
}

/// Decodes with the default options.
pub fn decode_value(value: &WireValue) -> FirestoreResult<FirestoreValue> {
    ValueEncoder::default().decode(value)
}
