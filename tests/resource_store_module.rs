use serde_json::{json, Value};
use shipwright::resource::{
    attr_str, ResourceStore, SqliteResourceStore, ATTR_WORKFLOW_FAMILY,
};
use shipwright::shared::ResourceId;
use tempfile::tempdir;

#[test]
fn attributes_round_trip_and_overwrite() {
    let tmp = tempdir().expect("tempdir");
    let store = SqliteResourceStore::open(&tmp.path().join("state.db")).expect("open");
    let resource = ResourceId::new(42);

    store
        .set_attribute(resource, "ip", Value::String("203.0.113.9".into()))
        .expect("set");
    store
        .set_attribute(resource, "custom_fields", json!({"php_version": "8.3"}))
        .expect("set object");
    store
        .set_attribute(resource, "ip", Value::String("203.0.113.10".into()))
        .expect("overwrite");

    let attrs = store.attributes(resource).expect("attrs");
    assert_eq!(attr_str(&attrs, "ip"), Some("203.0.113.10"));
    assert_eq!(
        attrs.get("custom_fields"),
        Some(&json!({"php_version": "8.3"}))
    );
}

#[test]
fn remove_attribute_is_idempotent() {
    let tmp = tempdir().expect("tempdir");
    let store = SqliteResourceStore::open(&tmp.path().join("state.db")).expect("open");
    let resource = ResourceId::new(42);

    store
        .set_attribute(resource, "region", Value::String("fra".into()))
        .expect("set");
    store.remove_attribute(resource, "region").expect("remove");
    store
        .remove_attribute(resource, "region")
        .expect("remove again");
    assert!(store.attributes(resource).expect("attrs").is_empty());
}

#[test]
fn flagged_lists_only_resources_in_the_family() {
    let tmp = tempdir().expect("tempdir");
    let store = SqliteResourceStore::open(&tmp.path().join("state.db")).expect("open");

    for (id, family) in [(1, "provision"), (2, "teardown"), (3, "provision")] {
        store
            .set_attribute(
                ResourceId::new(id),
                ATTR_WORKFLOW_FAMILY,
                Value::String(family.into()),
            )
            .expect("flag");
    }

    let flagged = store.flagged("provision").expect("flagged");
    assert_eq!(flagged, vec![ResourceId::new(1), ResourceId::new(3)]);
    assert!(store.flagged("unknown").expect("none").is_empty());
}

#[test]
fn attributes_are_scoped_per_resource() {
    let tmp = tempdir().expect("tempdir");
    let store = SqliteResourceStore::open(&tmp.path().join("state.db")).expect("open");

    store
        .set_attribute(ResourceId::new(1), "ip", Value::String("a".into()))
        .expect("set");
    store
        .set_attribute(ResourceId::new(2), "ip", Value::String("b".into()))
        .expect("set");

    assert_eq!(
        attr_str(&store.attributes(ResourceId::new(1)).expect("attrs"), "ip"),
        Some("a")
    );
    assert_eq!(
        attr_str(&store.attributes(ResourceId::new(2)).expect("attrs"), "ip"),
        Some("b")
    );
}
