use super::{LogError, LogStore};
use crate::lifecycle::LifecycleStore;
use crate::resource::{attr_str, ResourceStore, ATTR_LOG_REFERENCE};
use crate::shared::ResourceId;
use crate::transport::{Credentials, Target, Transport, TransportError};
use serde_json::Value;

pub const PLEASE_WAIT_MESSAGE: &str =
    "Command is still running. Logs will be available once it finishes, please wait.";

/// Two-phase log retrieval. While a command runs, the intermediate remote log
/// is streamed back on demand; once the command is done the final log is
/// pulled and persisted over the placeholder entry created at first request.
pub struct LogRetriever<'a> {
    transport: &'a dyn Transport,
    logs: &'a LogStore,
    lifecycle: &'a LifecycleStore,
    remote_log_dir: String,
}

impl<'a> LogRetriever<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        logs: &'a LogStore,
        lifecycle: &'a LifecycleStore,
        remote_log_dir: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            logs,
            lifecycle,
            remote_log_dir: remote_log_dir.into(),
        }
    }

    fn remote_path(&self, command_name: &str, done: bool) -> String {
        let suffix = if done { ".done.log" } else { ".log" };
        format!(
            "{}/{}{suffix}",
            self.remote_log_dir.trim_end_matches('/'),
            command_name
        )
    }

    /// Returns the placeholder reference for the command, creating the entry
    /// and recording it on the resource on first request.
    fn ensure_placeholder(
        &self,
        resources: &dyn ResourceStore,
        resource: ResourceId,
        command_name: &str,
        now: i64,
    ) -> Result<String, LogError> {
        let attrs = resources.attributes(resource)?;
        if let Some(reference) = attr_str(&attrs, ATTR_LOG_REFERENCE) {
            return Ok(reference.to_string());
        }
        let reference = self.logs.create_placeholder(command_name, now)?;
        resources.set_attribute(
            resource,
            ATTR_LOG_REFERENCE,
            Value::String(reference.clone()),
        )?;
        Ok(reference)
    }

    pub fn get_logs(
        &self,
        resources: &dyn ResourceStore,
        target: &Target,
        credentials: &Credentials,
        resource: ResourceId,
        command_name: &str,
        now: i64,
    ) -> Result<String, LogError> {
        let reference = self.ensure_placeholder(resources, resource, command_name, now)?;

        if self.lifecycle.is_done(resource, command_name)? {
            match self
                .transport
                .download(target, credentials, &self.remote_path(command_name, true))
            {
                Ok(content) => {
                    self.logs.rewrite(&reference, &content, now)?;
                    return Ok(content);
                }
                // Older agents only ever write the intermediate file.
                Err(TransportError::NotFound { .. }) => {}
                Err(_) => return Ok(PLEASE_WAIT_MESSAGE.to_string()),
            }
            return match self.transport.download(
                target,
                credentials,
                &self.remote_path(command_name, false),
            ) {
                Ok(content) => {
                    self.logs.rewrite(&reference, &content, now)?;
                    Ok(content)
                }
                Err(_) => Ok(PLEASE_WAIT_MESSAGE.to_string()),
            };
        }

        match self
            .transport
            .download(target, credentials, &self.remote_path(command_name, false))
        {
            Ok(content) => Ok(content),
            // The agent may have just completed and renamed the log before
            // the done callback landed here; the final file is authoritative.
            Err(TransportError::NotFound { .. }) => {
                match self.transport.download(
                    target,
                    credentials,
                    &self.remote_path(command_name, true),
                ) {
                    Ok(content) => {
                        self.logs.rewrite(&reference, &content, now)?;
                        Ok(content)
                    }
                    Err(_) => Ok(PLEASE_WAIT_MESSAGE.to_string()),
                }
            }
            Err(_) => Ok(PLEASE_WAIT_MESSAGE.to_string()),
        }
    }
}
