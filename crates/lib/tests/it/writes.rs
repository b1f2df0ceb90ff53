//! Splitting logical writes into per-location writes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use normref::store::{EventType, Snapshot, StoreError};
use serde_json::{Value, json};

use crate::helpers::*;

#[test]
fn set_routes_each_field_to_its_location() {
    let store = test_store();
    let reference = user_profile(&store);
    let (done, seen) = recorded();

    reference
        .set(json!({"id": "ignored", "name": "Kato", "about": "cat"}), Some(done))
        .unwrap();

    assert_eq!(store.value_at("users/kato"), json!({"name": "Kato"}));
    assert_eq!(store.value_at("profiles/kato"), json!({"bio": "cat"}));
    assert_eq!(*seen.lock().unwrap(), vec![Ok(())]);
}

#[test]
fn set_clears_mapped_fields_missing_from_the_data() {
    let store = test_store();
    store
        .reference("users/kato")
        .set(json!({"name": "Kato", "age": 3}), None, None);
    store
        .reference("profiles/kato")
        .set(json!({"bio": "cat"}), None, None);
    let reference = user_profile(&store);

    reference.set(json!({"name": "K"}), None).unwrap();
    assert_eq!(store.value_at("users/kato"), json!({"name": "K", "age": 3}));
    assert_eq!(store.value_at("profiles/kato"), Value::Null);
}

#[test]
fn update_touches_only_named_fields() {
    let store = test_store();
    store
        .reference("users/kato")
        .set(json!({"name": "Kato"}), None, None);
    store
        .reference("profiles/kato")
        .set(json!({"bio": "cat"}), None, None);
    let reference = user_profile(&store);

    reference.update(json!({"about": "tabby"}), None).unwrap();
    assert_eq!(store.value_at("users/kato"), json!({"name": "Kato"}));
    assert_eq!(store.value_at("profiles/kato"), json!({"bio": "tabby"}));
}

#[test]
fn remove_clears_every_mapped_field() {
    let store = test_store();
    store
        .reference("users/kato")
        .set(json!({"name": "Kato", "age": 3}), None, None);
    store
        .reference("profiles/kato")
        .set(json!({"bio": "cat"}), None, None);
    let reference = user_profile(&store);
    let (done, seen) = recorded();

    reference.remove(Some(done)).unwrap();
    assert_eq!(store.value_at("users/kato"), json!({"age": 3}));
    assert_eq!(store.value_at("profiles/kato"), Value::Null);
    assert_eq!(*seen.lock().unwrap(), vec![Ok(())]);
}

#[test]
fn one_physical_write_per_distinct_location() {
    let store = test_store();
    let (reference, log) = spied_collection(&store);

    reference
        .set(json!({"x": 1, "y": 2, "bx": 3, "c": 4}), None)
        .unwrap();
    let calls = take_calls(&log);
    assert_eq!(calls, ["a:update", "b:update", "c:set"]);
    assert_eq!(store.value_at("a"), json!({"x": 1, "y": 2}));
    assert_eq!(store.value_at("b"), json!({"x": 3}));
    assert_eq!(store.value_at("c"), json!(4));

    reference.update(json!({"y": 5}), None).unwrap();
    assert_eq!(take_calls(&log), ["a:update"]);
}

#[test]
fn unmapped_keys_go_to_the_master_location() {
    let store = test_store();
    let reference = user_profile(&store);
    reference
        .update(json!({"name": "Kato", "age": 3}), None)
        .unwrap();
    assert_eq!(store.value_at("users/kato"), json!({"name": "Kato", "age": 3}));
    assert_eq!(store.value_at("profiles/kato"), Value::Null);
}

#[test]
fn unmapped_keys_without_a_master_fail_synchronously() {
    let store = test_store();
    let paths = normref::path::PathManager::new(vec![
        normref::path::Path::with_alias(store.reference("a"), "a"),
        normref::path::Path::with_alias(store.reference("b"), "b"),
    ])
    .unwrap();
    let mut map = normref::field_map::FieldMap::new(paths);
    map.add_selector("a.x").unwrap();
    map.add_selector("b.y").unwrap();
    let reference = normref::NormalizedRef::new(normref::Record::set(map).unwrap());

    let (done, seen) = recorded();
    let err = reference.update(json!({"z": 1}), Some(done)).unwrap_err();
    assert!(err.is_master_error());
    assert!(err.is_structural_error());
    assert!(seen.lock().unwrap().is_empty());

    reference.update(json!({"x": 1, "y": 2}), None).unwrap();
    assert_eq!(store.value_at("a"), json!({"x": 1}));
    assert_eq!(store.value_at("b"), json!({"y": 2}));
}

#[test]
fn scalar_data_is_rejected_for_joined_records() {
    let store = test_store();
    let reference = user_profile(&store);
    let (done, seen) = recorded();
    let err = reference.set(json!(42), Some(done)).unwrap_err();
    assert!(err.is_structural_error());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn child_writes_target_the_physical_location() {
    let store = test_store();
    let reference = user_profile(&store);
    reference.child("about").unwrap().set(json!("cat"), None).unwrap();
    assert_eq!(store.value_at("profiles/kato/bio"), json!("cat"));

    reference.child("age").unwrap().set(json!(3), None).unwrap();
    assert_eq!(store.value_at("users/kato/age"), json!(3));
}

#[test]
fn key_fields_are_read_only_through_their_child() {
    let store = test_store();
    let reference = user_profile(&store);
    let err = reference.child("id").unwrap().set(json!("x"), None).unwrap_err();
    assert!(err.is_structural_error());
}

#[test]
fn failures_surface_through_the_single_callback() {
    let store = test_store();
    store.deny_writes("profiles");
    let reference = user_profile(&store);
    let (done, seen) = recorded();

    reference
        .set(json!({"name": "Kato", "about": "cat"}), Some(done))
        .unwrap();

    let results = seen.lock().unwrap().clone();
    assert_eq!(results.len(), 1);
    assert!(matches!(
        &results[0],
        Err(StoreError::PermissionDenied { path }) if path == "profiles/kato/bio"
    ));
    // Writes that succeeded are not rolled back.
    assert_eq!(store.value_at("users/kato"), json!({"name": "Kato"}));
}

#[test]
fn callback_waits_for_every_location() {
    let store = test_store();
    let reference = user_profile(&store);
    store.root().go_offline();
    let (done, seen) = recorded();

    reference
        .set(json!({"name": "Kato", "about": "cat"}), Some(done))
        .unwrap();
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(store.pending_completions(), 2);

    store.root().go_online();
    assert_eq!(*seen.lock().unwrap(), vec![Ok(())]);
}

#[test]
fn priority_goes_to_the_master_location() {
    let store = test_store();
    let (reference, log) = spied_collection(&store);

    reference
        .set_with_priority(json!({"x": 1, "bx": 2}), json!(10), None)
        .unwrap();
    assert_eq!(
        take_calls(&log),
        ["a:update", "b:update", "c:set", "a:set_priority"]
    );

    let priority = Arc::new(Mutex::new(None));
    let sink = priority.clone();
    let id = store.reference("a").on(
        EventType::Value,
        Arc::new(move |snap: &Snapshot| {
            *sink.lock().unwrap() = snap.priority().cloned();
        }),
        None,
    );
    store.reference("a").off(EventType::Value, id);
    assert_eq!(*priority.lock().unwrap(), Some(json!(10)));
}

#[test]
fn embedded_priority_is_applied_to_the_master() {
    let store = test_store();
    let (reference, log) = spied_collection(&store);
    reference
        .update(json!({"x": 1, ".priority": 3}), None)
        .unwrap();
    assert_eq!(take_calls(&log), ["a:update", "a:set_priority"]);
    assert_eq!(store.value_at("a"), json!({"x": 1}));
}

#[test]
fn empty_update_completes_immediately() {
    let store = test_store();
    let (reference, log) = spied_collection(&store);
    let (done, seen) = recorded();
    reference.update(json!({}), Some(done)).unwrap();
    assert!(take_calls(&log).is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![Ok(())]);
}

#[test]
fn push_generates_unique_keys_without_writing() {
    let store = test_store();
    let (reference, log) = spied_collection(&store);

    let keys: HashSet<String> = (0..50)
        .map(|_| reference.push().unwrap().key())
        .collect();
    assert_eq!(keys.len(), 50);
    let calls = take_calls(&log);
    assert_eq!(calls.len(), 50);
    assert!(calls.iter().all(|call| call == "a:push"));
    assert_eq!(store.value_at("a"), Value::Null);
}

#[test]
fn push_ids_sort_in_creation_order() {
    let store = test_store();
    let reference = user_profile(&store);
    let keys: Vec<String> = (0..20)
        .map(|_| reference.push().unwrap().key())
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert!(keys.iter().all(|key| key.len() == 20));
}

#[test]
fn push_with_data_sets_once_and_returns_before_completion() {
    let store = test_store();
    let (reference, log) = spied_collection(&store);
    store.root().go_offline();
    take_calls(&log);
    let (done, seen) = recorded();

    let child = reference.push_with(json!({"n": 1}), Some(done)).unwrap();
    assert!(seen.lock().unwrap().is_empty());
    let calls = take_calls(&log);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], "a:push");
    assert_eq!(calls[1], format!("a/{}:set", child.key()));
    assert_eq!(child.url(), url(&format!("a/{}", child.key())));
    assert_eq!(
        store.value_at(&format!("a/{}", child.key())),
        json!({"n": 1})
    );

    store.root().go_online();
    assert_eq!(*seen.lock().unwrap(), vec![Ok(())]);
}

#[tokio::test]
async fn awaitable_writes_resolve_with_the_aggregate_result() {
    let store = test_store();
    let reference = user_profile(&store);

    reference
        .set_async(json!({"name": "Kato", "about": "cat"}))
        .await
        .unwrap();
    assert_eq!(store.value_at("profiles/kato"), json!({"bio": "cat"}));

    reference.update_async(json!({"name": "K"})).await.unwrap();
    assert_eq!(store.value_at("users/kato"), json!({"name": "K"}));

    store.deny_writes("users");
    let err = reference.remove_async().await.unwrap_err();
    assert!(err.is_permission_denied());
    assert_eq!(err.module(), "store");
}
