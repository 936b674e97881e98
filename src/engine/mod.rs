use crate::classify::{Outcome, PatternRegistry};
use crate::config::Settings;
use crate::lifecycle::{LifecycleError, LifecycleStore, STATUS_ERRORED};
use crate::logs::{LogError, LogRetriever, LogStore};
use crate::resource::{
    attr_str, ResourceError, ResourceStore, ATTR_HOST, ATTR_LAST_COMMAND, ATTR_PROVIDER,
    ATTR_SSH_KEY, ATTR_SSH_PASSPHRASE, ATTR_SSH_PORT, ATTR_SSH_USER,
};
use crate::shared::{logging, ResourceId};
use crate::template::{compile, ScriptCatalog, TemplateError};
use crate::transport::{Credentials, Target, Transport, TransportError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The command dispatched to bring a fresh machine under management. It is
/// issued bare, without a uniquifying suffix, so repeated provisioning
/// attempts converge on one record.
pub const BOOTSTRAP_COMMAND: &str = "prepare_server";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("resource {resource} is missing required attribute `{key}`")]
    MissingAttribute { resource: ResourceId, key: String },
    #[error("failed to generate callback nonce: {reason}")]
    Nonce { reason: String },
}

/// Result of one `dispatch_command` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched {
        command_name: String,
        classified: Outcome,
        output: String,
    },
    /// Another command holds the resource mutex; nothing was executed.
    Busy { holder: String },
    /// No template exists for the script; logged no-op.
    NoTemplate { script: String },
}

/// Orchestration facade. Owns every collaborator and is handed to workflow
/// handlers; construction is explicit so tests wire in fakes at the
/// transport seam.
pub struct Engine {
    catalog: ScriptCatalog,
    transport: Box<dyn Transport>,
    lifecycle: LifecycleStore,
    logs: LogStore,
    classifier: PatternRegistry,
    settings: Settings,
}

impl Engine {
    pub fn new(
        catalog: ScriptCatalog,
        transport: Box<dyn Transport>,
        lifecycle: LifecycleStore,
        logs: LogStore,
        classifier: PatternRegistry,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            transport,
            lifecycle,
            logs,
            classifier,
            settings,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleStore {
        &self.lifecycle
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn log_retriever(&self) -> LogRetriever<'_> {
        LogRetriever::new(
            self.transport.as_ref(),
            &self.logs,
            &self.lifecycle,
            self.settings.remote_log_dir.clone(),
        )
    }

    pub fn connection_for(
        &self,
        resource: ResourceId,
        attrs: &Map<String, Value>,
    ) -> Result<(Target, Credentials), EngineError> {
        let require = |key: &str| -> Result<String, EngineError> {
            attr_str(attrs, key)
                .map(str::to_string)
                .ok_or_else(|| EngineError::MissingAttribute {
                    resource,
                    key: key.to_string(),
                })
        };
        let host = require(ATTR_HOST)?;
        let port = attr_str(attrs, ATTR_SSH_PORT)
            .and_then(|raw| raw.parse::<u16>().ok())
            .unwrap_or(22);
        let credentials = Credentials {
            username: require(ATTR_SSH_USER)?,
            private_key: require(ATTR_SSH_KEY)?,
            passphrase: attr_str(attrs, ATTR_SSH_PASSPHRASE).map(str::to_string),
        };
        Ok((Target::new(host, port), credentials))
    }

    /// Compiles the script for the resource, acquires the command mutex,
    /// executes the result over the transport and classifies the output.
    /// A `Failure` or `Ambiguous` classification marks the record errored;
    /// `completed` only ever arrives through the callback receiver.
    pub fn dispatch_command(
        &self,
        resources: &dyn ResourceStore,
        resource: ResourceId,
        script: &str,
        extra_tokens: &BTreeMap<String, String>,
        now: i64,
    ) -> Result<DispatchOutcome, EngineError> {
        let attrs = resources.attributes(resource)?;
        let provider = attr_str(&attrs, ATTR_PROVIDER);

        let command_name = if script == BOOTSTRAP_COMMAND {
            script.to_string()
        } else {
            format!("{script}_{now}")
        };

        let nonce = generate_nonce()?;
        let mut tokens = string_attrs(&attrs);
        tokens.insert("COMMAND_NAME".to_string(), command_name.clone());
        tokens.insert("NONCE".to_string(), nonce.clone());
        tokens.insert(
            "CALLBACK_URL".to_string(),
            format!(
                "http://{}/{resource}/{command_name}",
                self.settings.callback_bind
            ),
        );
        tokens.insert(
            "LOG_FILE".to_string(),
            format!("{}/{command_name}.log", self.settings.remote_log_dir),
        );
        tokens.insert(
            "DONE_LOG_FILE".to_string(),
            format!("{}/{command_name}.done.log", self.settings.remote_log_dir),
        );
        // Caller-supplied tokens win over the computed defaults.
        for (key, value) in extra_tokens {
            tokens.insert(key.clone(), value.clone());
        }

        let custom_fields = custom_fields(&attrs);
        let command_text =
            match compile(&self.catalog, provider, script, &tokens, &custom_fields) {
                Ok(text) => text,
                Err(TemplateError::NotFound { script, tried }) => {
                    self.log_line(&format!(
                        "event=no_template resource={resource} script={script} tried=\"{tried}\""
                    ));
                    return Ok(DispatchOutcome::NoTemplate { script });
                }
                Err(err) => return Err(err.into()),
            };

        let start = self.lifecycle.start(resource, &command_name, now)?;
        if !start.acquired() {
            return Ok(DispatchOutcome::Busy {
                holder: start.holder().to_string(),
            });
        }

        let (target, credentials) = match self.connection_for(resource, &attrs) {
            Ok(connection) => connection,
            Err(err) => {
                // Nothing ran; keeping the record would wedge the mutex.
                self.lifecycle.clear(resource, &command_name)?;
                return Err(err);
            }
        };

        resources.set_attribute(
            resource,
            ATTR_LAST_COMMAND,
            Value::String(command_name.clone()),
        )?;

        let output = match self
            .transport
            .exec(&target, &credentials, &command_text, None, None)
        {
            Ok(output) => output,
            Err(err) if err.is_transient() => {
                self.lifecycle.clear(resource, &command_name)?;
                self.log_line(&format!(
                    "event=dispatch_retryable resource={resource} command={command_name} error=\"{err}\""
                ));
                return Err(err.into());
            }
            Err(err) => {
                self.lifecycle
                    .update(resource, &command_name, STATUS_ERRORED, &Map::new(), now)?;
                self.log_line(&format!(
                    "event=dispatch_failed resource={resource} command={command_name} error=\"{err}\""
                ));
                return Err(err.into());
            }
        };

        let classified = self.classifier.classify(script, &output);
        if !classified.is_success() {
            self.lifecycle
                .update(resource, &command_name, STATUS_ERRORED, &Map::new(), now)?;
        }
        self.log_line(&format!(
            "event=dispatched resource={resource} command={command_name} classified={classified:?}"
        ));

        Ok(DispatchOutcome::Dispatched {
            command_name,
            classified,
            output,
        })
    }

    fn log_line(&self, line: &str) {
        let stamped = format!("ts={} {line}", logging::log_stamp(crate::shared::now_secs()));
        let _ = logging::append_engine_log_line(&self.settings.state_root, &stamped);
    }
}

fn string_attrs(attrs: &Map<String, Value>) -> BTreeMap<String, String> {
    attrs
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_str()
                .map(|text| (key.clone(), text.to_string()))
        })
        .collect()
}

fn custom_fields(attrs: &Map<String, Value>) -> BTreeMap<String, String> {
    attrs
        .get("custom_fields")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|text| (key.clone(), text.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn generate_nonce() -> Result<String, EngineError> {
    let mut bytes = [0u8; 4];
    getrandom::getrandom(&mut bytes).map_err(|err| EngineError::Nonce {
        reason: err.to_string(),
    })?;
    Ok(u32::from_le_bytes(bytes).to_string())
}
