use super::test_utilities::*;
use test_log::test;
use wirebind::{DynamicMessage, FieldKind, MapKey, Value};

#[test]
fn all_scalars_round_trip() {
    let message = sample_scalars();
    let decoded = DynamicMessage::decode(&ALL_SCALARS, &message.serialize()).unwrap();
    assert_eq!(decoded, message);
    assert_eq!(decoded.get_field(14).unwrap().as_str(), Some("héllo"));
    assert_eq!(decoded.get_field(4).unwrap().as_i64(), Some(i64::MIN));
}

#[test]
fn nested_map_enum_and_recursive_round_trip() {
    let message = sample_outer();
    let bytes = message.serialize();
    let decoded = DynamicMessage::decode(&OUTER, &bytes).unwrap();
    assert_eq!(decoded, message);

    let counts = decoded.field(3).and_then(Value::as_map).unwrap();
    assert_eq!(counts.get(&MapKey::from("y")), Some(&Value::I32(-2)));

    let tree = decoded.field(5).and_then(Value::as_message).unwrap();
    let children = tree.field(2).and_then(Value::as_list).unwrap();
    assert_eq!(children.len(), 2);
    let right = children[1].as_message().unwrap();
    assert_eq!(right.get_field(1).unwrap().as_str(), Some("right"));
}

#[test]
fn serialization_is_deterministic() {
    let message = sample_outer();
    let first = message.serialize();
    let second = message.clone().serialize();
    assert_eq!(first, second);

    // insertion order does not affect output
    let mut reordered = DynamicMessage::new(&OUTER);
    for number in [5, 4, 3, 2, 1] {
        let value = message.field(number).unwrap().clone();
        reordered.set_field(number, value).unwrap();
    }
    assert_eq!(reordered.serialize(), first);
}

#[test]
fn nan_and_signed_zero_round_trip() {
    let mut message = DynamicMessage::new(&ALL_SCALARS);
    message.set_field(1, f64::NAN).unwrap();
    message.set_field(2, -0.0f32).unwrap();
    let decoded = DynamicMessage::decode(&ALL_SCALARS, &message.serialize()).unwrap();
    assert_eq!(decoded, message);
    assert!(decoded.get_field(1).unwrap().as_f64().unwrap().is_nan());
    assert_ne!(decoded, DynamicMessage::new(&ALL_SCALARS));

    let mut lists = DynamicMessage::new(&PACKED_LISTS);
    lists
        .set_field(4, Value::list([f64::NAN, f64::NEG_INFINITY]))
        .unwrap();
    let decoded = DynamicMessage::decode(&PACKED_LISTS, &lists.serialize()).unwrap();
    assert_eq!(decoded, lists);
}

#[test]
fn empty_message_serializes_to_nothing() {
    for descriptor in [&ALL_SCALARS, &PACKED_LISTS, &OUTER] {
        let message = DynamicMessage::new(descriptor);
        assert!(message.serialize().is_empty());
        assert_eq!(DynamicMessage::decode(descriptor, &[]).unwrap(), message);
    }
}

#[test]
fn unset_equals_explicit_zero() {
    let mut explicit = DynamicMessage::new(&ALL_SCALARS);
    for field in ALL_SCALARS.fields {
        explicit
            .set_field(field.number, Value::default_for(field))
            .unwrap();
    }
    assert_eq!(explicit, DynamicMessage::new(&ALL_SCALARS));
    assert!(explicit.serialize().is_empty());
}

#[test]
fn packed_lists_round_trip() {
    let mut message = DynamicMessage::new(&PACKED_LISTS);
    message.set_field(1, Value::list([1, -1, i32::MAX])).unwrap();
    message.set_field(2, Value::list([i64::MIN, 0i64, 3])).unwrap();
    message.set_field(3, Value::list([1u32, 2, 3])).unwrap();
    message.set_field(4, Value::list([0.5f64, -0.0])).unwrap();
    message.set_field(5, Value::list([true, false])).unwrap();
    message.set_field(6, Value::list(["a", "", "c"])).unwrap();
    message.set_field(7, Value::list([u64::MAX, 0])).unwrap();

    let decoded = DynamicMessage::decode(&PACKED_LISTS, &message.serialize()).unwrap();
    assert_eq!(decoded, message);
}

#[test]
fn get_field_reports_zero_for_unset_and_none_for_unknown() {
    let message = DynamicMessage::new(&OUTER);
    assert_eq!(message.get_field(4).unwrap().as_enum(), Some(0));
    assert_eq!(message.get_field(2).unwrap().as_list(), Some(&[][..]));
    assert!(message.get_field(99).is_none());
    assert!(message.get_field_by_name("missing").is_none());
}

#[test]
fn nested_messages_are_copied_on_assignment() {
    let mut child = inner("before", 1);
    let mut outer = DynamicMessage::new(&OUTER);
    outer.set_field(1, child.clone()).unwrap();
    child.set_field(1, "after").unwrap();

    let stored = outer.get_field(1).unwrap();
    let stored = stored.as_message().unwrap();
    assert_eq!(stored.get_field(1).unwrap().as_str(), Some("before"));
}

#[test]
fn clear_field_and_clear() {
    let mut message = sample_outer();
    assert!(message.has_field(1));
    assert!(message.clear_field(1).is_some());
    assert!(!message.has_field(1));
    message.clear();
    assert_eq!(message, DynamicMessage::new(&OUTER));
}

#[test]
fn enum_kind_accepts_unknown_numbers() {
    let mut message = DynamicMessage::new(&OUTER);
    message.set_field(4, Value::Enum(42)).unwrap();
    let decoded = DynamicMessage::decode(&OUTER, &message.serialize()).unwrap();
    assert_eq!(decoded.get_field(4).unwrap().as_enum(), Some(42));
    assert_eq!(KIND.name_of(2), Some("KIND_BRANCH"));
    assert_eq!(KIND.name_of(42), None);
    assert!(matches!(OUTER.field(4).unwrap().kind, FieldKind::Enum(_)));
}
