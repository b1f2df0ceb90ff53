//! Child/parent/root navigation and naming of normalized references.

use std::sync::Arc;

use serde_json::json;

use crate::helpers::*;

#[test]
fn multi_segment_child_equals_repeated_descent() {
    let store = test_store();
    let reference = user_profile(&store);

    let jumped = reference.child("about/a/b").unwrap();
    let stepped = reference
        .child("about")
        .unwrap()
        .child("a")
        .unwrap()
        .child("b")
        .unwrap();

    assert_eq!(jumped, stepped);
    assert_eq!(jumped.url(), url("profiles/kato/bio/a/b"));
    assert_eq!(jumped.key(), "b");

    let mut jumped_chain = Vec::new();
    let mut stepped_chain = Vec::new();
    let (mut a, mut b) = (Some(jumped.clone()), Some(stepped.clone()));
    while let (Some(x), Some(y)) = (a, b) {
        jumped_chain.push(x.url());
        stepped_chain.push(y.url());
        a = x.parent();
        b = y.parent();
    }
    assert_eq!(jumped_chain, stepped_chain);
    assert_eq!(jumped_chain.len(), 4);
    assert_eq!(jumped.root(), stepped.root());
    assert_eq!(jumped.root(), reference);
}

#[test]
fn root_has_no_parent_and_is_its_own_root() {
    let store = test_store();
    let reference = user_profile(&store);
    assert!(reference.parent().is_none());
    assert_eq!(reference.root(), reference);
    assert_eq!(reference.child("name").unwrap().parent().unwrap(), reference);
}

#[test]
fn empty_segments_are_ignored_but_an_empty_path_fails() {
    let store = test_store();
    let reference = user_profile(&store);
    assert_eq!(
        reference.child("/about//x/").unwrap(),
        reference.child("about/x").unwrap()
    );
    let err = reference.child("").unwrap_err();
    assert!(err.is_structural_error());
}

#[test]
fn field_children_resolve_through_the_field_map() {
    let store = test_store();
    let reference = user_profile(&store);

    let about = reference.child("about").unwrap();
    assert_eq!(about.key(), "about");
    assert_eq!(about.url(), url("profiles/kato/bio"));

    let id = reference.child("id").unwrap();
    assert_eq!(id.url(), url("users/kato"));

    let unmapped = reference.child("age").unwrap();
    assert_eq!(unmapped.url(), url("users/kato/age"));
}

#[test]
fn joined_names_and_urls() {
    let store = test_store();
    let reference = user_profile(&store);
    assert_eq!(reference.key(), "[u][p]");
    assert_eq!(
        reference.to_string(),
        format!("[{}][{}]", url("users/kato"), url("profiles/kato"))
    );
}

#[test]
fn single_path_collections_use_the_location_name() {
    let store = test_store();
    let reference = normref::NormalizedCollection::new([store.reference("users/kato")])
        .select(["name"])
        .reference()
        .unwrap();
    assert_eq!(reference.key(), "kato");
    assert_eq!(reference.to_string(), url("users/kato"));
}

#[test]
fn deprecated_name_matches_key_and_warns_each_call() {
    let store = test_store();
    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let reference = normref::NormalizedCollection::new([store.reference("users/kato")])
        .select(["name"])
        .diagnostics(diagnostics.clone())
        .reference()
        .unwrap();
    let child = reference.child("name").unwrap();

    #[allow(deprecated)]
    let names = [reference.name(), reference.name(), child.name()];
    assert_eq!(names, ["kato".to_string(), "kato".to_string(), "name".to_string()]);
    assert_eq!(diagnostics.deprecated.lock().unwrap().len(), 3);
    assert_eq!(diagnostics.deprecated.lock().unwrap()[0], ("name()", "key()"));
}

#[test]
fn snapshots_navigate_like_references() {
    let store = test_store();
    store
        .reference("users/kato")
        .set(json!({"name": "Kato", "age": 3}), None, None);
    store
        .reference("profiles/kato")
        .set(json!({"bio": {"short": "cat"}}), None, None);
    let reference = user_profile(&store);

    let received = Arc::new(std::sync::Mutex::new(None));
    let sink = received.clone();
    let id = reference.on(
        normref::store::EventType::Value,
        move |snap| *sink.lock().unwrap() = Some(snap.clone()),
        None,
    );
    reference.off(normref::store::EventType::Value, id);

    let snap = received.lock().unwrap().clone().unwrap();
    assert_eq!(snap.key(), "[u][p]");
    assert_eq!(snap.child("about/short").unwrap().val(), json!("cat"));
    assert!(snap.has_child("name"));
    assert!(!snap.has_child("missing"));
    assert_eq!(snap.num_children(), 3);
    assert_eq!(snap.child("age").unwrap().val(), json!(3));

    let mut names = Vec::new();
    let aborted = snap
        .for_each(|child| {
            names.push(child.key());
            child.key() == "name"
        })
        .unwrap();
    assert!(aborted);
    assert_eq!(names, ["id", "name"]);
}
