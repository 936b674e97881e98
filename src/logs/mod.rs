mod retrieve;
mod store;

pub use retrieve::{LogRetriever, PLEASE_WAIT_MESSAGE};
pub use store::LogStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub reference: String,
    pub command_name: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
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
    #[error("failed to generate log reference: {reason}")]
    Reference { reason: String },
    #[error(transparent)]
    Lifecycle(#[from] crate::lifecycle::LifecycleError),
    #[error(transparent)]
    Resource(#[from] crate::resource::ResourceError),
}
