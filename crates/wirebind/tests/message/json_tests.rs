use super::test_utilities::*;
use test_log::test;
use wirebind::{DynamicMessage, JsonError, Value};

#[test]
fn scalars_json_round_trip() {
    let message = sample_scalars();
    let text = message.to_json().unwrap();
    assert!(text.contains(r#""int64Value":"-9223372036854775808""#), "{text}");
    assert!(text.contains(r#""uint64Value":"18446744073709551615""#), "{text}");
    assert!(text.contains(r#""bytesValue":"AAEC/w==""#), "{text}");
    assert!(text.contains(r#""kindValue":"KIND_LEAF""#), "{text}");

    let parsed = DynamicMessage::from_json(&ALL_SCALARS, &text).unwrap();
    assert_eq!(parsed, message);
    assert_eq!(parsed.serialize(), message.serialize());
}

#[test]
fn nested_json_round_trip() {
    let message = sample_outer();
    let text = message.to_json_pretty().unwrap();
    let parsed = DynamicMessage::from_json(&OUTER, &text).unwrap();
    assert_eq!(parsed, message);
}

#[test]
fn lists_keep_order_and_empty_lists_are_written() {
    let mut message = DynamicMessage::new(&PACKED_LISTS);
    message.set_field(1, Value::list([0, 1, 321, -65999, 123245, -3, 3])).unwrap();
    message.set_field(6, Value::list(["aaaa", ""])).unwrap();
    message.set_field(4, Value::list(Vec::<f64>::new())).unwrap();
    assert_eq!(
        message.to_json().unwrap(),
        r#"{"int32List":[0,1,321,-65999,123245,-3,3],"doubleList":[],"stringList":["aaaa",""]}"#
    );
}

#[test]
fn non_finite_floats_round_trip() {
    let mut message = DynamicMessage::new(&PACKED_LISTS);
    message
        .set_field(4, Value::list([f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.5]))
        .unwrap();
    let text = message.to_json().unwrap();
    assert_eq!(text, r#"{"doubleList":["NaN","Infinity","-Infinity",0.5]}"#);
    assert_eq!(DynamicMessage::from_json(&PACKED_LISTS, &text).unwrap(), message);
}

#[test]
fn json_and_wire_forms_agree() {
    let text = r#"{"inner":{"name":"first","value":1},"counts":{"x":1,"y":-2},"kind":"KIND_BRANCH"}"#;
    let from_json = DynamicMessage::from_json(&OUTER, text).unwrap();
    let from_wire = DynamicMessage::decode(&OUTER, &from_json.serialize()).unwrap();
    assert_eq!(from_wire, from_json);
    assert_eq!(from_wire.get_field(4).unwrap().as_enum(), Some(2));
}

#[test]
fn mistyped_values_are_rejected() {
    let err = DynamicMessage::from_json(&OUTER, r#"{"items":{"name":"a"}}"#).unwrap_err();
    assert!(matches!(err, JsonError::InvalidValue { field: "items", .. }));

    let err = DynamicMessage::from_json(&OUTER, r#"{"inner":{"name":5}}"#).unwrap_err();
    assert!(matches!(err, JsonError::InvalidValue { field: "name", .. }));

    let err = DynamicMessage::from_json(&ALL_SCALARS, r#"{"int32Value":4294967296}"#).unwrap_err();
    assert!(matches!(err, JsonError::InvalidValue { field: "int32_value", .. }));
}
