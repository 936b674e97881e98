use shipwright::lifecycle::{LifecycleStore, STATUS_COMPLETED};
use shipwright::logs::{LogRetriever, LogStore, PLEASE_WAIT_MESSAGE};
use shipwright::resource::{attr_str, ResourceStore, SqliteResourceStore, ATTR_LOG_REFERENCE};
use shipwright::shared::ResourceId;
use shipwright::transport::{Credentials, Target, Transport, TransportError};
use serde_json::Map;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tempfile::tempdir;

#[derive(Default)]
struct FakeTransport {
    files: Mutex<BTreeMap<String, String>>,
}

impl FakeTransport {
    fn put(&self, remote: &str, content: &str) {
        self.files
            .lock()
            .expect("lock")
            .insert(remote.to_string(), content.to_string());
    }
}

impl Transport for FakeTransport {
    fn exec(
        &self,
        _target: &Target,
        _credentials: &Credentials,
        _command: &str,
        _remaining_budget: Option<std::time::Duration>,
        _progress: Option<shipwright::transport::ProgressFn<'_>>,
    ) -> Result<String, TransportError> {
        Ok(String::new())
    }

    fn upload(
        &self,
        _target: &Target,
        _credentials: &Credentials,
        _local: &Path,
        remote: &str,
    ) -> Result<(), TransportError> {
        self.put(remote, "");
        Ok(())
    }

    fn download(
        &self,
        _target: &Target,
        _credentials: &Credentials,
        remote: &str,
    ) -> Result<String, TransportError> {
        self.files
            .lock()
            .expect("lock")
            .get(remote)
            .cloned()
            .ok_or_else(|| TransportError::NotFound {
                path: remote.to_string(),
            })
    }
}

fn credentials() -> Credentials {
    Credentials {
        username: "deploy".to_string(),
        private_key: "key".to_string(),
        passphrase: None,
    }
}

struct Fixture {
    transport: FakeTransport,
    logs: LogStore,
    lifecycle: LifecycleStore,
    resources: SqliteResourceStore,
}

fn fixture(dir: &tempfile::TempDir) -> Fixture {
    let db = dir.path().join("state.db");
    Fixture {
        transport: FakeTransport::default(),
        logs: LogStore::open(&db).expect("logs"),
        lifecycle: LifecycleStore::open(&db, 3600).expect("lifecycle"),
        resources: SqliteResourceStore::open(&db).expect("resources"),
    }
}

#[test]
fn running_command_streams_the_intermediate_file_and_creates_one_placeholder() {
    let tmp = tempdir().expect("tempdir");
    let fx = fixture(&tmp);
    let resource = ResourceId::new(5);
    let target = Target::new("203.0.113.9", 22);

    fx.lifecycle
        .start(resource, "install_wp_100", 100)
        .expect("start");
    fx.transport
        .put("/var/log/shipwright/install_wp_100.log", "unpacking...");

    let retriever = LogRetriever::new(&fx.transport, &fx.logs, &fx.lifecycle, "/var/log/shipwright");
    let first = retriever
        .get_logs(&fx.resources, &target, &credentials(), resource, "install_wp_100", 110)
        .expect("first");
    assert_eq!(first, "unpacking...");

    let second = retriever
        .get_logs(&fx.resources, &target, &credentials(), resource, "install_wp_100", 120)
        .expect("second");
    assert_eq!(second, "unpacking...");

    // Exactly one placeholder, still empty while the command runs.
    assert_eq!(
        fx.logs.count_for_command("install_wp_100").expect("count"),
        1
    );
    let attrs = fx.resources.attributes(resource).expect("attrs");
    let reference = attr_str(&attrs, ATTR_LOG_REFERENCE).expect("reference");
    let entry = fx.logs.load(reference).expect("load").expect("entry");
    assert_eq!(entry.content, "");
}

#[test]
fn completion_rewrites_the_placeholder_with_the_final_log() {
    let tmp = tempdir().expect("tempdir");
    let fx = fixture(&tmp);
    let resource = ResourceId::new(5);
    let target = Target::new("203.0.113.9", 22);

    fx.lifecycle
        .start(resource, "install_wp_100", 100)
        .expect("start");
    fx.transport
        .put("/var/log/shipwright/install_wp_100.log", "partial");

    let retriever = LogRetriever::new(&fx.transport, &fx.logs, &fx.lifecycle, "/var/log/shipwright");
    retriever
        .get_logs(&fx.resources, &target, &credentials(), resource, "install_wp_100", 110)
        .expect("while running");
    let attrs = fx.resources.attributes(resource).expect("attrs");
    let reference = attr_str(&attrs, ATTR_LOG_REFERENCE)
        .expect("reference")
        .to_string();

    fx.lifecycle
        .update(resource, "install_wp_100", STATUS_COMPLETED, &Map::new(), 150)
        .expect("complete");
    fx.transport
        .put("/var/log/shipwright/install_wp_100.done.log", "all done");

    let final_text = retriever
        .get_logs(&fx.resources, &target, &credentials(), resource, "install_wp_100", 160)
        .expect("after completion");
    assert_eq!(final_text, "all done");

    let entry = fx.logs.load(&reference).expect("load").expect("entry");
    assert_eq!(entry.content, "all done");
    assert_eq!(
        fx.logs.count_for_command("install_wp_100").expect("count"),
        1
    );
}

#[test]
fn done_command_falls_back_to_the_intermediate_file() {
    let tmp = tempdir().expect("tempdir");
    let fx = fixture(&tmp);
    let resource = ResourceId::new(6);
    let target = Target::new("203.0.113.9", 22);

    fx.lifecycle
        .start(resource, "backup_200", 200)
        .expect("start");
    fx.lifecycle
        .update(resource, "backup_200", STATUS_COMPLETED, &Map::new(), 210)
        .expect("complete");
    fx.transport
        .put("/var/log/shipwright/backup_200.log", "archive written");

    let retriever = LogRetriever::new(&fx.transport, &fx.logs, &fx.lifecycle, "/var/log/shipwright");
    let text = retriever
        .get_logs(&fx.resources, &target, &credentials(), resource, "backup_200", 220)
        .expect("fallback");
    assert_eq!(text, "archive written");
}

#[test]
fn running_command_races_completion_and_falls_back_to_the_final_file() {
    let tmp = tempdir().expect("tempdir");
    let fx = fixture(&tmp);
    let resource = ResourceId::new(5);
    let target = Target::new("203.0.113.9", 22);

    // The agent already swapped the intermediate file for the final one,
    // but its done callback has not landed yet.
    fx.lifecycle
        .start(resource, "install_wp_100", 100)
        .expect("start");
    fx.transport
        .put("/var/log/shipwright/install_wp_100.done.log", "final content");

    let retriever = LogRetriever::new(&fx.transport, &fx.logs, &fx.lifecycle, "/var/log/shipwright");
    let text = retriever
        .get_logs(&fx.resources, &target, &credentials(), resource, "install_wp_100", 110)
        .expect("race fallback");
    assert_eq!(text, "final content");

    let attrs = fx.resources.attributes(resource).expect("attrs");
    let reference = attr_str(&attrs, ATTR_LOG_REFERENCE).expect("reference");
    let entry = fx.logs.load(reference).expect("load").expect("entry");
    assert_eq!(entry.content, "final content");
}

#[test]
fn missing_files_degrade_to_a_wait_message_not_an_error() {
    let tmp = tempdir().expect("tempdir");
    let fx = fixture(&tmp);
    let resource = ResourceId::new(6);
    let target = Target::new("203.0.113.9", 22);

    let retriever = LogRetriever::new(&fx.transport, &fx.logs, &fx.lifecycle, "/var/log/shipwright");
    let text = retriever
        .get_logs(&fx.resources, &target, &credentials(), resource, "backup_200", 220)
        .expect("degrade");
    assert_eq!(text, PLEASE_WAIT_MESSAGE);
}
