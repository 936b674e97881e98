mod store;

pub use store::SqliteResourceStore;

use crate::shared::ResourceId;
use serde_json::{Map, Value};

/// Well-known attribute keys the engine reads and writes. Everything else in
/// the dictionary (provider, region, ip, credential reference, custom fields)
/// is opaque pass-through owned by the external entity store.
pub const ATTR_PROVIDER: &str = "provider";
pub const ATTR_WORKFLOW_FAMILY: &str = "workflow_family";
pub const ATTR_WORKFLOW_ACTION: &str = "workflow_action";
pub const ATTR_WORKFLOW_STATUS: &str = "workflow_status";
pub const ATTR_WORKFLOW_ARGS: &str = "workflow_args";
pub const ATTR_LOG_REFERENCE: &str = "log_reference";
pub const ATTR_LAST_COMMAND: &str = "last_command";
pub const ATTR_HOST: &str = "ip";
pub const ATTR_SSH_PORT: &str = "ssh_port";
pub const ATTR_SSH_USER: &str = "ssh_user";
pub const ATTR_SSH_KEY: &str = "ssh_private_key";
pub const ATTR_SSH_PASSPHRASE: &str = "ssh_passphrase";
pub const ATTR_INSTANCE_STATE: &str = "instance_state";

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create state directory {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("invalid attribute value stored for resource {resource} key `{key}`: {source}")]
    Attribute {
        resource: ResourceId,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The per-resource attribute dictionary supplied by the external entity
/// store. The engine consumes it as an opaque key/value map keyed by
/// resource id.
pub trait ResourceStore {
    fn attributes(&self, resource: ResourceId) -> Result<Map<String, Value>, ResourceError>;

    fn set_attribute(
        &self,
        resource: ResourceId,
        key: &str,
        value: Value,
    ) -> Result<(), ResourceError>;

    fn remove_attribute(&self, resource: ResourceId, key: &str) -> Result<(), ResourceError>;

    /// Resources flagged with an in-progress workflow for the given family.
    fn flagged(&self, family: &str) -> Result<Vec<ResourceId>, ResourceError>;
}

pub fn attr_str<'a>(attrs: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str)
}
