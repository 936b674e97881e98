use super::DispatcherError;
use crate::engine::Engine;
use crate::resource::ResourceStore;
use crate::shared::ResourceId;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Collaborators a step handler may touch during one tick.
pub struct StepContext<'a> {
    pub engine: &'a Engine,
    pub resources: &'a dyn ResourceStore,
}

/// What a handler decided about its step. Handlers whose precondition is not
/// yet satisfied return `NotReady` and will be re-invoked on the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    NotReady,
    Advance { next_action: String },
    Complete,
    Failed { reason: String },
}

pub trait StepHandler {
    fn action(&self) -> &str;

    fn run(
        &self,
        ctx: &StepContext<'_>,
        resource: ResourceId,
        attrs: &Map<String, Value>,
        now: i64,
    ) -> Result<StepOutcome, DispatcherError>;
}

/// Action name -> handler. Unknown actions fail the workflow rather than
/// silently stalling it.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn StepHandler>) {
        self.handlers.insert(handler.action().to_string(), handler);
    }

    pub fn get(&self, action: &str) -> Option<&dyn StepHandler> {
        self.handlers.get(action).map(Box::as_ref)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("actions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
