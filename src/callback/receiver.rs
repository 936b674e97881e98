use super::{
    base_command_name, parse_callback_path, CallbackRequest, CallbackResponse, CommandEvent,
    CommandEventBus, StatusRegistry,
};
use crate::lifecycle::{LifecycleStore, UpdateOutcome, STATUS_COMPLETED};
use crate::resource::{ResourceStore, ATTR_LOG_REFERENCE};
use serde_json::{Map, Value};

/// Applies decoded agent callbacks to the lifecycle store and fans the status
/// change out to registered listeners. Pure request-in, response-out; the
/// socket loop lives in `CallbackServer`.
pub struct CallbackReceiver {
    lifecycle: LifecycleStore,
    resources: Box<dyn ResourceStore + Send>,
    bus: CommandEventBus,
    statuses: StatusRegistry,
}

impl CallbackReceiver {
    pub fn new(
        lifecycle: LifecycleStore,
        resources: Box<dyn ResourceStore + Send>,
        bus: CommandEventBus,
        statuses: StatusRegistry,
    ) -> Self {
        Self {
            lifecycle,
            resources,
            bus,
            statuses,
        }
    }

    pub fn handle(&self, path: &str, now: i64) -> CallbackResponse {
        let request = match parse_callback_path(path, &self.statuses) {
            Ok(request) => request,
            Err(response) => return response,
        };
        match self.apply(&request, now) {
            Ok(response) => response,
            Err(err) => CallbackResponse::Error(format!("callback not applied: {err}")),
        }
    }

    fn apply(
        &self,
        request: &CallbackRequest,
        now: i64,
    ) -> Result<CallbackResponse, crate::lifecycle::LifecycleError> {
        let mut extra = Map::new();
        extra.insert("nonce".to_string(), Value::String(request.nonce.clone()));

        let outcome = self.lifecycle.update(
            request.resource,
            request.command_name.as_str(),
            &request.status,
            &extra,
            now,
        )?;

        if request.status == STATUS_COMPLETED {
            // The stale placeholder reference must not survive completion,
            // otherwise the next command would render the old log.
            let _ = self
                .resources
                .remove_attribute(request.resource, ATTR_LOG_REFERENCE);
        }

        if matches!(outcome, UpdateOutcome::Ignored) {
            return Ok(CallbackResponse::Data(format!(
                "status `{}` ignored for finished command {}",
                request.status, request.command_name
            )));
        }

        self.bus.emit(&CommandEvent {
            resource: request.resource,
            base_name: base_command_name(request.command_name.as_str()),
            full_name: request.command_name.to_string(),
            status: request.status.clone(),
        });

        Ok(CallbackResponse::Data(format!(
            "status `{}` recorded for {}",
            request.status, request.command_name
        )))
    }
}
