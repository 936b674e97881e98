mod provision;
mod registry;
mod tick;

pub use provision::{flag_provisioning, register_provisioning, PROVISION_FAMILY};
pub use registry::{HandlerRegistry, StepContext, StepHandler, StepOutcome};
pub use tick::{Dispatcher, TickReport};

use crate::resource::{attr_str, ATTR_WORKFLOW_ACTION, ATTR_WORKFLOW_STATUS};
use crate::shared::ResourceId;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Ready,
    InProcess,
    Complete,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Ready => "ready",
            StepStatus::InProcess => "in_process",
            StepStatus::Complete => "complete",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ready" => Some(StepStatus::Ready),
            "in_process" => Some(StepStatus::InProcess),
            "complete" => Some(StepStatus::Complete),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

/// The deferred unit of work as stored in the resource attribute dictionary.
/// No thread survives between ticks; this is all the progress there is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStep {
    pub resource: ResourceId,
    pub action: String,
    pub status: StepStatus,
}

impl PendingStep {
    pub fn from_attrs(resource: ResourceId, attrs: &Map<String, Value>) -> Option<Self> {
        let action = attr_str(attrs, ATTR_WORKFLOW_ACTION)?.to_string();
        let status = attr_str(attrs, ATTR_WORKFLOW_STATUS)
            .and_then(StepStatus::parse)
            .unwrap_or(StepStatus::Ready);
        Some(Self {
            resource,
            action,
            status,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error(transparent)]
    Resource(#[from] crate::resource::ResourceError),
    #[error(transparent)]
    Lifecycle(#[from] crate::lifecycle::LifecycleError),
    #[error(transparent)]
    Engine(#[from] crate::engine::EngineError),
}
