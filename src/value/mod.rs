mod array_value;
mod codec;
mod convert;
mod map_value;
mod value;
mod wire;

pub use array_value::ArrayValue;
pub use codec::{decode_value, encode_value, ValueEncoder};
pub use convert::IntoFirestoreValue;
pub use map_value::MapValue;
pub use value::{FirestoreValue, ValueKind};
pub use wire::{fields_from_json, fields_to_json, WireValue};
