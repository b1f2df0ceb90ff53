//! Record construction, merge and key iteration.

use normref::{
    NormalizedCollection, PathSpec, Record,
    field_map::{FieldMap, PhysicalKey},
    path::{Path, PathManager},
    record::{RecordError, RecordField},
    store::Snapshot,
};
use serde_json::{Value, json};

use crate::helpers::*;

fn leaf_map(location: &str, fields: &[(&str, PhysicalKey)]) -> FieldMap {
    let store = test_store();
    let paths = PathManager::new(vec![Path::new(store.reference(location))]).unwrap();
    let path = paths.first().clone();
    let mut map = FieldMap::new(paths);
    for (alias, physical) in fields {
        map.add(&path, physical.clone(), *alias).unwrap();
    }
    map
}

fn snap(key: &str, value: Value) -> Snapshot {
    Snapshot::new(Some(key.to_string()), value)
}

#[test]
fn leaf_construction_accepts_every_single_field_shape() {
    for physical in [
        PhysicalKey::Key,
        PhysicalKey::Value,
        PhysicalKey::Child("name".into()),
    ] {
        let record = Record::field(leaf_map("users/kato", &[("f", physical.clone())])).unwrap();
        assert_eq!(record.kind(), "RecordField");
    }
}

#[test]
fn leaf_construction_rejects_wrong_counts() {
    let store = test_store();
    let two = PathManager::new(vec![
        Path::new(store.reference("a")),
        Path::new(store.reference("b")),
    ])
    .unwrap();
    let first = two.first().clone();
    let mut map = FieldMap::new(two);
    map.add(&first, PhysicalKey::Value, "v").unwrap();
    let err = Record::field(map).unwrap_err();
    assert!(err.is_structural_error());
    assert_eq!(err.module(), "record");

    let none = leaf_map("a", &[]);
    assert!(matches!(
        RecordField::new(none),
        Err(RecordError::FieldCount { actual: 0, .. })
    ));

    let many = leaf_map("a", &[("x", PhysicalKey::Value), ("y", PhysicalKey::Key)]);
    assert!(Record::field(many).unwrap_err().is_structural_error());
}

#[test]
fn duplicate_logical_names_fail_at_configuration_time() {
    let store = test_store();
    let err = NormalizedCollection::new([store.reference("a")])
        .select(["x", "y as x"])
        .record()
        .unwrap_err();
    assert!(err.is_structural_error());
    assert_eq!(err.module(), "field_map");
}

#[test]
fn for_each_key_follows_declaration_order_and_skips_absent_fields() {
    let record = Record::set(leaf_map(
        "item",
        &[
            ("A", PhysicalKey::Child("a".into())),
            ("B", PhysicalKey::Child("b".into())),
            ("C", PhysicalKey::Child("c".into())),
        ],
    ))
    .unwrap();

    let full = [snap("item", json!({"c": 3, "a": 1, "b": 2}))];
    let mut seen = Vec::new();
    let aborted = record
        .for_each_key(&full, |key| {
            seen.push(key.to_string());
            false
        })
        .unwrap();
    assert!(!aborted);
    assert_eq!(seen, ["A", "B", "C"]);

    let partial = [snap("item", json!({"c": 3, "a": 1}))];
    let keys: Vec<&str> = record.keys(&partial).unwrap().collect();
    assert_eq!(keys, ["A", "C"]);
}

#[test]
fn for_each_key_abort_propagates() {
    let record = Record::set(leaf_map(
        "item",
        &[
            ("A", PhysicalKey::Child("a".into())),
            ("B", PhysicalKey::Child("b".into())),
            ("C", PhysicalKey::Child("c".into())),
        ],
    ))
    .unwrap();
    let snaps = [snap("item", json!({"a": 1, "b": 2, "c": 3}))];

    let mut seen = Vec::new();
    let aborted = record
        .for_each_key(&snaps, |key| {
            seen.push(key.to_string());
            key == "B"
        })
        .unwrap();
    assert!(aborted);
    assert_eq!(seen, ["A", "B"]);
}

#[test]
fn leaf_for_each_key_yields_reserved_markers_unconditionally() {
    let record = Record::field(leaf_map("n", &[("n", PhysicalKey::Value)])).unwrap();
    let empty = [snap("n", Value::Null)];
    let keys: Vec<&str> = record.keys(&empty).unwrap().collect();
    assert_eq!(keys, ["$value"]);
    assert!(record.keys(&[]).is_err());
}

#[test]
fn leaf_merge_returns_raw_or_export_value() {
    let record = Record::field(leaf_map("n", &[("n", PhysicalKey::Value)])).unwrap();
    let with_priority = snap("n", json!({"a": 1})).with_priority(Some(json!("p")));

    assert_eq!(
        record.merge_data(&[with_priority.clone()], false).unwrap(),
        json!({"a": 1})
    );
    assert_eq!(
        record.merge_data(&[with_priority.clone()], true).unwrap(),
        json!({"a": 1, ".priority": "p"})
    );
    for wrong in [vec![], vec![with_priority.clone(), with_priority]] {
        let err = record.merge_data(&wrong, false).unwrap_err();
        assert!(err.is_structural_error());
    }
}

#[test]
fn leaf_child_snaps_reuse_the_snapshot_contract() {
    let record = Record::field(leaf_map("n", &[("n", PhysicalKey::Value)])).unwrap();
    let children = record
        .get_child_snaps(&[snap("n", json!({"deep": {"er": 1}}))], "deep")
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].key(), Some("deep"));

    let grandchild = record.child("deep").unwrap();
    assert_eq!(
        grandchild.merge_data(&children, false).unwrap(),
        json!({"er": 1})
    );
}

#[test]
fn joined_merge_uses_each_fields_own_snapshot() {
    let store = test_store();
    let reference = user_profile(&store);
    let record = reference.record();
    let snaps = [
        snap("kato", json!({"name": "Kato", "age": 3})),
        snap("kato", json!({"bio": "cat", "name": "ignored"})),
    ];
    let merged = record.merge_data(&snaps, false).unwrap();
    assert_eq!(
        merged,
        object([
            ("id", json!("kato")),
            ("name", json!("Kato")),
            ("about", json!("cat")),
        ])
    );
    let order: Vec<&String> = merged.as_object().unwrap().keys().collect();
    assert_eq!(order, ["id", "name", "about"]);

    let sparse = [
        snap("kato", json!({"age": 3})),
        snap("kato", json!({"bio": "cat"})),
    ];
    let keys: Vec<&str> = record.keys(&sparse).unwrap().collect();
    assert_eq!(keys, ["id", "about"]);
}

#[test]
fn joined_merge_of_empty_locations_is_null() {
    let store = test_store();
    let reference = NormalizedCollection::new([
        PathSpec::new(store.reference("a")).alias("a"),
        PathSpec::new(store.reference("b")).alias("b"),
    ])
    .select(["a.x", "b.y"])
    .reference()
    .unwrap();
    let merged = reference
        .record()
        .merge_data(&[snap("a", Value::Null), snap("b", Value::Null)], false)
        .unwrap();
    assert_eq!(merged, Value::Null);
}
