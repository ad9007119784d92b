use super::test_utilities::*;
use parking_lot::Mutex;
use std::sync::Arc;
use test_log::test;
use wirebind::{DynamicMessage, FieldError, ListModel, ModelChange, Value};

#[test]
fn reset_from_repeated_message_field() {
    let model = ListModel::new();
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    model.on_change(move |change| sink.lock().push(*change));

    let outer = sample_outer();
    model.reset_from_field(&outer, 2).unwrap();

    assert_eq!(model.row_count(), 2);
    assert_eq!(model.get(0), Some(inner("a", -5)));
    assert_eq!(*changes.lock(), vec![ModelChange::Reset]);
}

#[test]
fn reset_from_unset_field_empties_the_model() {
    let model = ListModel::from_rows(vec![inner("stale", 1)]);
    model
        .reset_from_field(&DynamicMessage::new(&OUTER), 2)
        .unwrap();
    assert_eq!(model.row_count(), 0);
}

#[test]
fn reset_from_non_list_field_is_rejected() {
    let model: ListModel<DynamicMessage> = ListModel::new();
    let outer = sample_outer();
    assert!(matches!(
        model.reset_from_field(&outer, 1),
        Err(FieldError::TypeMismatch { field: "inner", .. })
    ));
    assert!(matches!(
        model.reset_from_field(&outer, 77),
        Err(FieldError::UnknownField { .. })
    ));
}

#[test]
fn rows_are_independent_of_the_source_message() {
    let model = ListModel::new();
    let mut outer = sample_outer();
    model.reset_from_field(&outer, 2).unwrap();

    outer.set_field(2, Value::list([inner("z", 9)])).unwrap();
    assert_eq!(model.get(1), Some(inner("b", 0)));
}
