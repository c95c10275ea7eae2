use firestore_rest::value::{decode_value, encode_value};
use firestore_rest::{
    build_field_mask, EncodingErrorKind, FirestoreValue, MapValue, Timestamp, ValueEncoder,
    ValueKind, WireValue,
};
use serde::Serialize;
use serde_json::json;

fn round_trip(value: FirestoreValue) -> FirestoreValue {
    decode_value(&encode_value(&value).unwrap()).unwrap()
}

#[test]
fn representable_values_round_trip() {
    let nested = MapValue::default()
        .with("name", "Ada")
        .with("born", 1815)
        .with("ratio", 0.25)
        .with("active", true)
        .with("nothing", FirestoreValue::null())
        .with("when", Timestamp::new(1_700_000_000, 123_000_000))
        .with(
            "tags",
            FirestoreValue::from_array(vec!["math".into(), FirestoreValue::from(1)]),
        )
        .with("empty_list", FirestoreValue::from_array(Vec::new()))
        .with("empty_map", MapValue::default());
    let value = FirestoreValue::from(nested);
    assert_eq!(round_trip(value.clone()), value);
}

#[test]
fn integers_travel_as_text() {
    let wire = encode_value(&FirestoreValue::from(i64::MAX)).unwrap();
    assert_eq!(wire.to_json(), json!({ "integerValue": i64::MAX.to_string() }));
    assert_eq!(decode_value(&wire).unwrap().as_integer(), Some(i64::MAX));
}

#[test]
fn dense_integer_keys_become_arrays() {
    let dense = FirestoreValue::from_json(&json!({ "1": "b", "0": "a", "2": "c" }));
    match encode_value(&dense).unwrap() {
        WireValue::Array(values) => {
            assert_eq!(values.len(), 3);
            assert_eq!(values[0], WireValue::String("a".into()));
            assert_eq!(values[2], WireValue::String("c".into()));
        }
        other => panic!("expected array, got {other:?}"),
    }

    let sparse = FirestoreValue::from_json(&json!({ "0": "a", "2": "c" }));
    assert!(matches!(encode_value(&sparse).unwrap(), WireValue::Map(_)));
}

#[test]
fn heuristic_applies_per_level() {
    let value = FirestoreValue::from_json(&json!({
        "points": { "0": { "x": 1 }, "1": { "x": 2 } },
        "0": "not an index at this level"
    }));
    let map = value.as_map().unwrap();
    assert!(matches!(map.get("points").unwrap().kind(), ValueKind::Array(_)));
}

#[test]
fn serde_types_expand_through_the_codec() {
    #[derive(Serialize)]
    struct City {
        name: String,
        population: u32,
        districts: Vec<String>,
    }

    let map = MapValue::from_serializable(&City {
        name: "Oslo".into(),
        population: 700_000,
        districts: vec!["Frogner".into()],
    })
    .unwrap();
    let document = ValueEncoder::new().encode_document(&map).unwrap();
    assert_eq!(
        document,
        json!({
            "fields": {
                "name": { "stringValue": "Oslo" },
                "population": { "integerValue": "700000" },
                "districts": { "arrayValue": { "values": [ { "stringValue": "Frogner" } ] } }
            }
        })
    );
}

#[test]
fn malformed_timestamp_is_an_encoding_error() {
    let err = ValueEncoder::new()
        .decode_json(&json!({ "timestampValue": "yesterday" }))
        .unwrap_err();
    assert_eq!(
        err.as_encoding().unwrap().kind,
        EncodingErrorKind::MalformedTimestamp
    );
}

#[test]
fn unknown_tags_pass_through() {
    let decoded = ValueEncoder::new()
        .decode_json(&json!({ "bytesValue": "AAEC" }))
        .unwrap();
    assert_eq!(decoded, FirestoreValue::from("AAEC"));
}

#[test]
fn field_masks_escape_numeric_segments() {
    assert_eq!(build_field_mask(["a.3.b"]).unwrap(), vec!["a.`3`.b"]);
    assert_eq!(build_field_mask(["a.b"]).unwrap(), vec!["a.b"]);
    assert_eq!(build_field_mask(["b", "a", "b"]).unwrap(), vec!["b", "a", "b"]);
    let err = build_field_mask(["a..b"]).unwrap_err();
    assert_eq!(
        err.as_encoding().unwrap().kind,
        EncodingErrorKind::InvalidFieldPath
    );
}
