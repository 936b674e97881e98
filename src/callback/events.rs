use crate::shared::ResourceId;
use std::collections::BTreeMap;

/// Notification emitted after a callback is applied to the lifecycle store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub resource: ResourceId,
    pub base_name: String,
    pub full_name: String,
    pub status: String,
}

type Listener = Box<dyn Fn(&CommandEvent) + Send>;

/// Fan-out for command status changes. Generic listeners fire for every
/// command; named listeners fire only when the base command matches. The
/// generic pass always runs first.
#[derive(Default)]
pub struct CommandEventBus {
    any: Vec<Listener>,
    by_command: BTreeMap<String, Vec<Listener>>,
}

impl CommandEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_any(&mut self, listener: impl Fn(&CommandEvent) + Send + 'static) {
        self.any.push(Box::new(listener));
    }

    pub fn on_command(
        &mut self,
        base_name: impl Into<String>,
        listener: impl Fn(&CommandEvent) + Send + 'static,
    ) {
        self.by_command
            .entry(base_name.into())
            .or_default()
            .push(Box::new(listener));
    }

    pub fn emit(&self, event: &CommandEvent) {
        for listener in &self.any {
            listener(event);
        }
        if let Some(listeners) = self.by_command.get(&event.base_name) {
            for listener in listeners {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for CommandEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEventBus")
            .field("any", &self.any.len())
            .field("by_command", &self.by_command.keys().collect::<Vec<_>>())
            .finish()
    }
}
