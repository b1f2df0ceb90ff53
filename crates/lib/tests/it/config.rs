//! Building collections from builders and JSON descriptions.

use normref::{CollectionConfig, NormalizedCollection, PathSpec, collection::PathConfig};
use serde_json::json;

use crate::helpers::*;

const USER_PROFILE: &str = r#"{
    "paths": [
        {"path": "users/kato", "alias": "u"},
        {"path": "profiles/kato", "alias": "p"}
    ],
    "fields": ["u.$key as id", "u.name", "p.bio as about"]
}"#;

#[test]
fn json_config_builds_the_same_reference_as_the_builder() {
    let store = test_store();
    let config = CollectionConfig::from_json(USER_PROFILE).unwrap();
    let from_json = config.build(&store.root()).unwrap();
    let from_builder = user_profile(&store);

    assert_eq!(from_json, from_builder);
    assert_eq!(from_json.key(), "[u][p]");
    assert_eq!(
        from_json.child("about").unwrap().url(),
        url("profiles/kato/bio")
    );

    // The first path is master when none is flagged.
    from_json.push().unwrap();
    from_json.set_priority(json!(1), None).unwrap();
    assert_eq!(store.value_at("profiles/kato"), serde_json::Value::Null);
}

#[test]
fn json_config_round_trips_and_omits_defaults() {
    let config = CollectionConfig {
        paths: vec![
            PathConfig {
                path: "a".into(),
                alias: None,
                master: false,
            },
            PathConfig {
                path: "b".into(),
                alias: Some("bee".into()),
                master: true,
            },
        ],
        fields: vec!["a.x".into()],
    };
    let encoded = config.to_json().unwrap();
    assert_eq!(
        encoded,
        r#"{"paths":[{"path":"a"},{"path":"b","alias":"bee","master":true}],"fields":["a.x"]}"#
    );
    assert_eq!(CollectionConfig::from_json(&encoded).unwrap(), config);
}

#[test]
fn flagged_master_receives_whole_store_operations() {
    let store = test_store();
    let config = CollectionConfig::from_json(
        r#"{"paths": [{"path": "a"}, {"path": "b", "master": true}], "fields": ["a.x", "b.y"]}"#,
    )
    .unwrap();
    let reference = config.build(&store.root()).unwrap();
    assert_eq!(reference.master().unwrap().url(), url("b"));

    reference.update(json!({"x": 1, "z": 2}), None).unwrap();
    assert_eq!(store.value_at("a"), json!({"x": 1}));
    assert_eq!(store.value_at("b"), json!({"z": 2}));
}

#[test]
fn missing_fields_key_is_an_incomplete_config() {
    let store = test_store();
    let config = CollectionConfig::from_json(r#"{"paths": [{"path": "a"}]}"#).unwrap();
    assert!(config.fields.is_empty());
    let err = config.build(&store.root()).unwrap_err();
    assert!(err.is_structural_error());
    assert_eq!(err.module(), "collection");
}

#[test]
fn malformed_json_is_a_serialization_error() {
    let err = CollectionConfig::from_json(r#"{"paths": "#).unwrap_err();
    assert_eq!(err.module(), "serialize");
    assert!(!err.is_structural_error());
}

#[test]
fn builder_rejects_broken_collections() {
    let store = test_store();

    let err = NormalizedCollection::new(Vec::<PathSpec>::new())
        .select(["x"])
        .reference()
        .unwrap_err();
    assert_eq!(err.module(), "collection");

    let err = NormalizedCollection::new([
        PathSpec::new(store.reference("a")).master(),
        PathSpec::new(store.reference("b")).master(),
    ])
    .select(["a.x"])
    .reference()
    .unwrap_err();
    assert!(err.is_master_error());

    let err = NormalizedCollection::new([store.reference("a"), store.reference("a")])
        .select(["a.x"])
        .reference()
        .unwrap_err();
    assert_eq!(err.module(), "path");

    let err = NormalizedCollection::new([store.reference("a"), store.reference("b")])
        .select(["c.x"])
        .reference()
        .unwrap_err();
    assert_eq!(err.module(), "field_map");

    let err = NormalizedCollection::new([store.reference("a"), store.reference("b")])
        .select(["x"])
        .reference()
        .unwrap_err();
    assert_eq!(err.module(), "field_map");
}

#[test]
fn selectors_default_to_the_child_or_path_name() {
    let store = test_store();
    store
        .reference("users/kato")
        .set(json!({"name": "Kato"}), None, None);
    store
        .reference("scores/kato")
        .set(json!(7), None, None);
    let reference = NormalizedCollection::new([
        PathSpec::new(store.reference("users/kato")).alias("u"),
        PathSpec::new(store.reference("scores/kato")).alias("s"),
    ])
    .select(["u.$key", "u.name", "s.$value"])
    .reference()
    .unwrap();
    let fields: Vec<&str> = reference
        .record()
        .field_map()
        .iter()
        .map(|entry| entry.alias())
        .collect();
    assert_eq!(fields, ["u", "name", "s"]);
    assert_eq!(
        reference.record().merge_data(&[], false).unwrap_err().module(),
        "record"
    );
}
