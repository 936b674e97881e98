mod store;

pub use store::LifecycleStore;

use crate::shared::ResourceId;
use serde_json::Map;
use serde_json::Value;

pub const STATUS_STARTED: &str = "started";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_ERRORED: &str = "errored";

/// Durable state of one dispatched remote operation. Absence is modeled as
/// `None` at the query surface; a terminal record is an explicit variant, not
/// an overloaded marker value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRecord {
    /// Terminal marker retained for idempotent completion queries until the
    /// caller clears it.
    Done,
    InFlight(InFlightRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightRecord {
    pub status: String,
    pub payload: Map<String, Value>,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Result of a `start` call. Starting while any command is active is a no-op
/// that reports the current holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Acquired { name: String },
    AlreadyHeld { holder: String },
}

impl StartOutcome {
    pub fn holder(&self) -> &str {
        match self {
            StartOutcome::Acquired { name } => name,
            StartOutcome::AlreadyHeld { holder } => holder,
        }
    }

    pub fn acquired(&self) -> bool {
        matches!(self, StartOutcome::Acquired { .. })
    }

    /// For callers that treat a held mutex as a hard error rather than a
    /// deferred retry.
    pub fn required(self, resource: ResourceId, requested: &str) -> Result<String, LifecycleError> {
        match self {
            StartOutcome::Acquired { name } => Ok(name),
            StartOutcome::AlreadyHeld { holder } => Err(LifecycleError::StateConflict {
                resource,
                holder,
                requested: requested.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Record replaced with the terminal marker; the mutex is released.
    Completed,
    /// Status merged into the in-flight payload; expiry re-extended.
    Merged,
    /// Dropped update: either a late non-terminal status arriving after
    /// completion, or a status for an absent command while a different
    /// command holds the mutex. Neither may disturb the active record.
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
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
    #[error("invalid payload stored for ({resource}, {command}): {source}")]
    Payload {
        resource: ResourceId,
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("resource {resource} is busy running `{holder}`; `{requested}` not started")]
    StateConflict {
        resource: ResourceId,
        holder: String,
        requested: String,
    },
}
