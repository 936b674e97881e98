use serde_json::Value;
use shipwright::callback::{
    base_command_name, parse_callback_path, CallbackReceiver, CommandEventBus, StatusRegistry,
};
use shipwright::lifecycle::LifecycleStore;
use shipwright::resource::{ResourceStore, SqliteResourceStore, ATTR_LOG_REFERENCE};
use shipwright::shared::ResourceId;
use std::sync::mpsc;
use tempfile::tempdir;

fn receiver(dir: &tempfile::TempDir, bus: CommandEventBus) -> CallbackReceiver {
    let db = dir.path().join("state.db");
    let lifecycle = LifecycleStore::open(&db, 3600).expect("lifecycle");
    let resources = SqliteResourceStore::open(&db).expect("resources");
    CallbackReceiver::new(lifecycle, Box::new(resources), bus, StatusRegistry::default())
}

#[test]
fn base_command_name_vectors() {
    assert_eq!(base_command_name("install_wp_1608639174"), "install_wp");
    assert_eq!(
        base_command_name("replace_domain---badvix05.wpvix.com---547"),
        "replace_domain"
    );
    assert_eq!(base_command_name("prepare_server"), "prepare_server");
    assert_eq!(base_command_name("clear_cache"), "clear_cache");
    assert_eq!(base_command_name("v2_migrate_42"), "v2_migrate");
}

#[test]
fn path_parsing_accepts_the_four_segment_grammar() {
    let statuses = StatusRegistry::default();
    let request =
        parse_callback_path("/42/install_wp_1608639174/completed/991214/", &statuses)
            .expect("parse");
    assert_eq!(request.resource, ResourceId::new(42));
    assert_eq!(request.command_name.as_str(), "install_wp_1608639174");
    assert_eq!(request.status, "completed");
    assert_eq!(request.nonce, "991214");
}

#[test]
fn path_parsing_rejects_each_malformed_segment() {
    let statuses = StatusRegistry::default();
    for path in [
        "/42/install_wp/completed/",
        "/abc/install_wp/completed/1/",
        "/42/in valid/completed/1/",
        "/42/install_wp/exploded/1/",
        "/42/install_wp/completed/not-a-nonce/",
    ] {
        let err = parse_callback_path(path, &statuses).expect_err(path);
        assert!(err.is_error(), "{path} should be rejected");
    }
}

#[test]
fn registered_extra_status_is_accepted() {
    let mut statuses = StatusRegistry::default();
    statuses.register("rebooting");
    assert!(parse_callback_path("/1/prepare_server/rebooting/5/", &statuses).is_ok());
}

#[test]
fn completion_callback_finishes_the_record_and_clears_the_log_reference() {
    let tmp = tempdir().expect("tempdir");
    let db = tmp.path().join("state.db");
    let lifecycle = LifecycleStore::open(&db, 3600).expect("lifecycle");
    let resources = SqliteResourceStore::open(&db).expect("resources");
    let resource = ResourceId::new(42);

    lifecycle
        .start(resource, "install_wp_100", 100)
        .expect("start");
    resources
        .set_attribute(resource, ATTR_LOG_REFERENCE, Value::String("log-abc".into()))
        .expect("set log ref");

    let receiver = CallbackReceiver::new(
        LifecycleStore::open(&db, 3600).expect("lifecycle"),
        Box::new(SqliteResourceStore::open(&db).expect("resources")),
        CommandEventBus::new(),
        StatusRegistry::default(),
    );
    let response = receiver.handle("/42/install_wp_100/completed/7/", 150);
    assert!(!response.is_error(), "{response:?}");

    assert!(lifecycle.is_done(resource, "install_wp_100").expect("done"));
    let attrs = resources.attributes(resource).expect("attrs");
    assert!(!attrs.contains_key(ATTR_LOG_REFERENCE));
}

#[test]
fn events_fire_generic_first_then_command_specific() {
    let tmp = tempdir().expect("tempdir");
    let (sender, events) = mpsc::channel::<String>();

    let mut bus = CommandEventBus::new();
    let any_sender = sender.clone();
    bus.on_any(move |event| {
        any_sender
            .send(format!("any:{}:{}", event.base_name, event.status))
            .expect("send");
    });
    bus.on_command("install_wp", move |event| {
        sender
            .send(format!("install_wp:{}", event.full_name))
            .expect("send");
    });

    let receiver = receiver(&tmp, bus);
    let response = receiver.handle("/7/install_wp_123/started/9/", 123);
    assert!(!response.is_error(), "{response:?}");

    assert_eq!(events.recv().expect("generic"), "any:install_wp:started");
    assert_eq!(
        events.recv().expect("specific"),
        "install_wp:install_wp_123"
    );
}

#[test]
fn malformed_path_is_answered_not_propagated() {
    let tmp = tempdir().expect("tempdir");
    let receiver = receiver(&tmp, CommandEventBus::new());
    let response = receiver.handle("/nope/", 10);
    assert!(response.is_error());
    assert!(response.to_json().starts_with("{\"error\""));
}
