use super::{HandlerRegistry, PendingStep, StepContext, StepOutcome, StepStatus};
use crate::resource::{
    ATTR_WORKFLOW_ACTION, ATTR_WORKFLOW_ARGS, ATTR_WORKFLOW_FAMILY, ATTR_WORKFLOW_STATUS,
};
use crate::shared::logging;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub examined: usize,
    pub advanced: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Periodic driver for one workflow family. Each tick re-reads the attribute
/// dictionary of every flagged resource and re-invokes the handler for its
/// stored current action.
pub struct Dispatcher {
    family: String,
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(family: impl Into<String>, registry: HandlerRegistry) -> Self {
        Self {
            family: family.into(),
            registry,
        }
    }

    pub fn tick(&self, ctx: &StepContext<'_>, now: i64) -> Result<TickReport, super::DispatcherError> {
        let mut report = TickReport::default();
        for resource in ctx.resources.flagged(&self.family)? {
            report.examined += 1;
            let attrs = ctx.resources.attributes(resource)?;
            let Some(step) = PendingStep::from_attrs(resource, &attrs) else {
                self.fail(ctx, resource, "no workflow action recorded")?;
                report.failed += 1;
                continue;
            };
            if matches!(step.status, StepStatus::Failed | StepStatus::Complete) {
                continue;
            }
            let Some(handler) = self.registry.get(&step.action) else {
                self.fail(
                    ctx,
                    resource,
                    &format!("no handler registered for action `{}`", step.action),
                )?;
                report.failed += 1;
                continue;
            };

            match handler.run(ctx, resource, &attrs, now) {
                Ok(StepOutcome::NotReady) => {
                    ctx.resources.set_attribute(
                        resource,
                        ATTR_WORKFLOW_STATUS,
                        Value::String(StepStatus::InProcess.as_str().to_string()),
                    )?;
                }
                Ok(StepOutcome::Advance { next_action }) => {
                    ctx.resources.set_attribute(
                        resource,
                        ATTR_WORKFLOW_ACTION,
                        Value::String(next_action),
                    )?;
                    ctx.resources.set_attribute(
                        resource,
                        ATTR_WORKFLOW_STATUS,
                        Value::String(StepStatus::Ready.as_str().to_string()),
                    )?;
                    report.advanced += 1;
                }
                Ok(StepOutcome::Complete) => {
                    for key in [
                        ATTR_WORKFLOW_FAMILY,
                        ATTR_WORKFLOW_ACTION,
                        ATTR_WORKFLOW_STATUS,
                        ATTR_WORKFLOW_ARGS,
                    ] {
                        ctx.resources.remove_attribute(resource, key)?;
                    }
                    report.completed += 1;
                }
                Ok(StepOutcome::Failed { reason }) => {
                    self.fail(ctx, resource, &reason)?;
                    report.failed += 1;
                }
                // Step state is untouched, so the next tick retries it.
                Err(err) => {
                    self.log(ctx, &format!(
                        "event=step_error resource={resource} action={} error=\"{err}\"",
                        step.action
                    ));
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    fn fail(
        &self,
        ctx: &StepContext<'_>,
        resource: crate::shared::ResourceId,
        reason: &str,
    ) -> Result<(), super::DispatcherError> {
        ctx.resources.set_attribute(
            resource,
            ATTR_WORKFLOW_STATUS,
            Value::String(StepStatus::Failed.as_str().to_string()),
        )?;
        self.log(ctx, &format!(
            "event=step_failed resource={resource} family={} reason=\"{reason}\"",
            self.family
        ));
        Ok(())
    }

    fn log(&self, ctx: &StepContext<'_>, line: &str) {
        let stamped = format!(
            "ts={} {line}",
            logging::log_stamp(crate::shared::now_secs())
        );
        let _ = logging::append_engine_log_line(&ctx.engine.settings().state_root, &stamped);
    }
}
