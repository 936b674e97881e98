use super::{DispatcherError, HandlerRegistry, StepContext, StepHandler, StepOutcome, StepStatus};
use crate::engine::{DispatchOutcome, EngineError, BOOTSTRAP_COMMAND};
use crate::notify::send_completion_notice;
use crate::resource::{
    attr_str, ResourceStore, ATTR_INSTANCE_STATE, ATTR_WORKFLOW_ACTION, ATTR_WORKFLOW_FAMILY,
    ATTR_WORKFLOW_STATUS,
};
use crate::shared::ResourceId;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const PROVISION_FAMILY: &str = "provision";

const ACTION_WAIT_FOR_ACTIVE: &str = "wait_for_active";
const ACTION_RUN_BOOTSTRAP: &str = "run_bootstrap";
const ACTION_WAIT_FOR_AGENT_READY: &str = "wait_for_agent_ready";
const ACTION_SEND_COMPLETION_NOTICE: &str = "send_completion_notice";

/// Flags a resource for provisioning; the next tick picks it up at the first
/// action.
pub fn flag_provisioning(
    resources: &dyn ResourceStore,
    resource: ResourceId,
) -> Result<(), crate::resource::ResourceError> {
    resources.set_attribute(
        resource,
        ATTR_WORKFLOW_FAMILY,
        Value::String(PROVISION_FAMILY.to_string()),
    )?;
    resources.set_attribute(
        resource,
        ATTR_WORKFLOW_ACTION,
        Value::String(ACTION_WAIT_FOR_ACTIVE.to_string()),
    )?;
    resources.set_attribute(
        resource,
        ATTR_WORKFLOW_STATUS,
        Value::String(StepStatus::Ready.as_str().to_string()),
    )
}

pub fn register_provisioning(registry: &mut HandlerRegistry) {
    registry.register(Box::new(WaitForActive));
    registry.register(Box::new(RunBootstrap));
    registry.register(Box::new(WaitForAgentReady));
    registry.register(Box::new(SendCompletionNotice));
}

/// Holds until the provider reports the machine running.
struct WaitForActive;

impl StepHandler for WaitForActive {
    fn action(&self) -> &str {
        ACTION_WAIT_FOR_ACTIVE
    }

    fn run(
        &self,
        _ctx: &StepContext<'_>,
        _resource: ResourceId,
        attrs: &Map<String, Value>,
        _now: i64,
    ) -> Result<StepOutcome, DispatcherError> {
        if attr_str(attrs, ATTR_INSTANCE_STATE) == Some("active") {
            return Ok(StepOutcome::Advance {
                next_action: ACTION_RUN_BOOTSTRAP.to_string(),
            });
        }
        Ok(StepOutcome::NotReady)
    }
}

/// Dispatches the bootstrap command. Completion arrives later through the
/// agent callback, never from the exec output itself.
struct RunBootstrap;

impl StepHandler for RunBootstrap {
    fn action(&self) -> &str {
        ACTION_RUN_BOOTSTRAP
    }

    fn run(
        &self,
        ctx: &StepContext<'_>,
        resource: ResourceId,
        _attrs: &Map<String, Value>,
        now: i64,
    ) -> Result<StepOutcome, DispatcherError> {
        // Re-entry after a restart: the record may already be there.
        if ctx.engine.lifecycle().is_done(resource, BOOTSTRAP_COMMAND)?
            || ctx
                .engine
                .lifecycle()
                .is_running(resource, BOOTSTRAP_COMMAND, now)?
        {
            return Ok(StepOutcome::Advance {
                next_action: ACTION_WAIT_FOR_AGENT_READY.to_string(),
            });
        }

        let dispatched = ctx.engine.dispatch_command(
            ctx.resources,
            resource,
            BOOTSTRAP_COMMAND,
            &BTreeMap::new(),
            now,
        );
        match dispatched {
            Ok(DispatchOutcome::Dispatched { classified, .. }) if classified.is_success() => {
                Ok(StepOutcome::Advance {
                    next_action: ACTION_WAIT_FOR_AGENT_READY.to_string(),
                })
            }
            Ok(DispatchOutcome::Dispatched { output, .. }) => Ok(StepOutcome::Failed {
                reason: format!("bootstrap output not recognized as success: {output}"),
            }),
            Ok(DispatchOutcome::Busy { .. }) => Ok(StepOutcome::NotReady),
            Ok(DispatchOutcome::NoTemplate { script }) => Ok(StepOutcome::Failed {
                reason: format!("no template for `{script}`"),
            }),
            Err(EngineError::Transport(err)) if err.is_transient() => Ok(StepOutcome::NotReady),
            Err(err) => Err(err.into()),
        }
    }
}

/// Holds until the remote agent reports bootstrap completion.
struct WaitForAgentReady;

impl StepHandler for WaitForAgentReady {
    fn action(&self) -> &str {
        ACTION_WAIT_FOR_AGENT_READY
    }

    fn run(
        &self,
        ctx: &StepContext<'_>,
        resource: ResourceId,
        _attrs: &Map<String, Value>,
        _now: i64,
    ) -> Result<StepOutcome, DispatcherError> {
        if ctx.engine.lifecycle().is_done(resource, BOOTSTRAP_COMMAND)? {
            return Ok(StepOutcome::Advance {
                next_action: ACTION_SEND_COMPLETION_NOTICE.to_string(),
            });
        }
        Ok(StepOutcome::NotReady)
    }
}

/// Posts the completion notice, then clears the bootstrap record so the
/// resource mutex has no stale terminal marker.
struct SendCompletionNotice;

impl StepHandler for SendCompletionNotice {
    fn action(&self) -> &str {
        ACTION_SEND_COMPLETION_NOTICE
    }

    fn run(
        &self,
        ctx: &StepContext<'_>,
        resource: ResourceId,
        _attrs: &Map<String, Value>,
        _now: i64,
    ) -> Result<StepOutcome, DispatcherError> {
        if let Some(endpoint) = ctx.engine.settings().notify_endpoint.as_deref() {
            if send_completion_notice(endpoint, resource, "provisioned").is_err() {
                // The endpoint may be briefly down; retry on the next tick.
                return Ok(StepOutcome::NotReady);
            }
        }
        ctx.engine.lifecycle().clear(resource, BOOTSTRAP_COMMAND)?;
        Ok(StepOutcome::Complete)
    }
}
