use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

fn default_exec_timeout_seconds() -> u64 {
    29
}

fn default_progress_timeout_seconds() -> u64 {
    15
}

fn default_safety_margin_seconds() -> u64 {
    5
}

fn default_long_running_timeout_seconds() -> i64 {
    3600
}

fn default_callback_bind() -> String {
    "127.0.0.1:8790".to_string()
}

fn default_remote_log_dir() -> String {
    "/var/log/shipwright".to_string()
}

fn default_true() -> bool {
    true
}

/// Engine settings, loaded from a YAML file. Every knob has a default so an
/// empty file is a valid configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Root for the state database and engine log.
    #[serde(default = "Settings::default_state_root")]
    pub state_root: PathBuf,
    /// Directory holding the script templates (named text blobs).
    #[serde(default = "Settings::default_template_dir")]
    pub template_dir: PathBuf,
    #[serde(default = "default_callback_bind")]
    pub callback_bind: String,
    /// Transport timeout when the caller supplies no execution budget.
    #[serde(default = "default_exec_timeout_seconds")]
    pub exec_default_timeout_seconds: u64,
    /// Transport timeout when a progress callback wants frequent partials.
    #[serde(default = "default_progress_timeout_seconds")]
    pub exec_progress_timeout_seconds: u64,
    /// Subtracted from the remaining execution budget before each exec.
    #[serde(default = "default_safety_margin_seconds")]
    pub exec_safety_margin_seconds: u64,
    /// Command record expiry; refreshed on every status update.
    #[serde(default = "default_long_running_timeout_seconds")]
    pub long_running_timeout_seconds: i64,
    /// When false, known fatal markers no longer override positive matches.
    #[serde(default = "default_true")]
    pub negative_override_enabled: bool,
    /// Remote directory holding per-command intermediate and final logs.
    #[serde(default = "default_remote_log_dir")]
    pub remote_log_dir: String,
    /// Endpoint receiving workflow completion notifications, if any.
    #[serde(default)]
    pub notify_endpoint: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_root: Self::default_state_root(),
            template_dir: Self::default_template_dir(),
            callback_bind: default_callback_bind(),
            exec_default_timeout_seconds: default_exec_timeout_seconds(),
            exec_progress_timeout_seconds: default_progress_timeout_seconds(),
            exec_safety_margin_seconds: default_safety_margin_seconds(),
            long_running_timeout_seconds: default_long_running_timeout_seconds(),
            negative_override_enabled: true,
            remote_log_dir: default_remote_log_dir(),
            notify_endpoint: None,
        }
    }
}

impl Settings {
    fn default_state_root() -> PathBuf {
        PathBuf::from("state")
    }

    fn default_template_dir() -> PathBuf {
        PathBuf::from("templates")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_root.join("shipwright.db")
    }
}
