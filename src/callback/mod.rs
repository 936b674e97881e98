mod events;
mod http;
mod receiver;

pub use events::{CommandEvent, CommandEventBus};
pub use http::CallbackServer;
pub use receiver::CallbackReceiver;

use crate::shared::{CommandName, ResourceId};
use serde_json::json;
use std::collections::BTreeSet;

/// Statuses the receiver accepts from remote agents. Extensible so deployments
/// can register provider-specific phases beside the built-in three.
#[derive(Debug, Clone)]
pub struct StatusRegistry {
    allowed: BTreeSet<String>,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        let mut allowed = BTreeSet::new();
        allowed.insert(crate::lifecycle::STATUS_STARTED.to_string());
        allowed.insert(crate::lifecycle::STATUS_COMPLETED.to_string());
        allowed.insert(crate::lifecycle::STATUS_ERRORED.to_string());
        Self { allowed }
    }
}

impl StatusRegistry {
    pub fn register(&mut self, status: impl Into<String>) {
        self.allowed.insert(status.into());
    }

    pub fn contains(&self, status: &str) -> bool {
        self.allowed.contains(status)
    }
}

/// One decoded agent callback: `/{resource_id}/{command_name}/{status}/{nonce}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub resource: ResourceId,
    pub command_name: CommandName,
    pub status: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResponse {
    Data(String),
    Error(String),
}

impl CallbackResponse {
    pub fn to_json(&self) -> String {
        match self {
            CallbackResponse::Data(message) => json!({ "data": message }).to_string(),
            CallbackResponse::Error(message) => json!({ "error": message }).to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CallbackResponse::Error(_))
    }
}

/// Decodes and validates a callback path. Every malformed segment yields a
/// distinct error message so agents can diagnose a bad hook URL from the
/// response body alone.
pub fn parse_callback_path(
    path: &str,
    statuses: &StatusRegistry,
) -> Result<CallbackRequest, CallbackResponse> {
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.len() != 4 {
        return Err(CallbackResponse::Error(format!(
            "expected /resource_id/command_name/status/nonce/, got {} segment(s)",
            segments.len()
        )));
    }

    let resource = ResourceId::parse(segments[0])
        .map_err(|_| CallbackResponse::Error(format!("invalid resource id `{}`", segments[0])))?;

    let command_name = CommandName::parse(segments[1]).map_err(|_| {
        CallbackResponse::Error(format!("invalid command name `{}`", segments[1]))
    })?;

    let status = segments[2];
    if !statuses.contains(status) {
        return Err(CallbackResponse::Error(format!(
            "unknown status `{status}`"
        )));
    }

    let nonce = segments[3];
    if nonce.is_empty() || !nonce.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(CallbackResponse::Error(format!("invalid nonce `{nonce}`")));
    }

    Ok(CallbackRequest {
        resource,
        command_name,
        status: status.to_string(),
        nonce: nonce.to_string(),
    })
}

/// Strips dispatch decoration from a command name back to the script it ran.
///
/// Dispatched names carry a `_{unix_seconds}` suffix for uniqueness, and some
/// carry inline arguments separated by `---`. The bootstrap command is
/// dispatched bare and passes through unchanged.
pub fn base_command_name(full_name: &str) -> String {
    if full_name == crate::engine::BOOTSTRAP_COMMAND {
        return full_name.to_string();
    }
    if let Some((base, _)) = full_name.split_once("---") {
        return base.to_string();
    }
    if let Some((base, suffix)) = full_name.rsplit_once('_') {
        if !base.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return base.to_string();
        }
    }
    full_name.to_string()
}
