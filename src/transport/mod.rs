mod audit;
mod session;
mod ssh;

pub use audit::{AuditEntry, AuditLog};
pub use ssh::SshTransport;

use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Pre-decrypted key material supplied by the external credential service.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub private_key: String,
    pub passphrase: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Login or network failure. Transient: no remote state was advanced.
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },
    #[error("remote path not found: {path}")]
    NotFound { path: String },
    #[error("remote execution exceeded {seconds}s timeout")]
    Timeout { seconds: u64 },
    #[error("transport i/o failed: {reason}")]
    Io { reason: String },
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connection { .. } | TransportError::Timeout { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub default_timeout: Duration,
    pub progress_timeout: Duration,
    pub safety_margin: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(29),
            progress_timeout: Duration::from_secs(15),
            safety_margin: Duration::from_secs(5),
        }
    }
}

impl TimeoutPolicy {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            default_timeout: Duration::from_secs(settings.exec_default_timeout_seconds),
            progress_timeout: Duration::from_secs(settings.exec_progress_timeout_seconds),
            safety_margin: Duration::from_secs(settings.exec_safety_margin_seconds),
        }
    }
}

/// Timeout selection for one exec call. A progress callback means the caller
/// wants frequent partial results, so the short fixed timeout applies;
/// otherwise the remaining execution budget minus the safety margin is used,
/// falling back to the configured default when the budget is unknown.
pub fn resolve_exec_timeout(
    policy: &TimeoutPolicy,
    wants_progress: bool,
    remaining_budget: Option<Duration>,
) -> Duration {
    if wants_progress {
        return policy.progress_timeout;
    }
    match remaining_budget {
        Some(remaining) => remaining
            .saturating_sub(policy.safety_margin)
            .max(Duration::from_secs(1)),
        None => policy.default_timeout,
    }
}

pub type ProgressFn<'a> = &'a mut dyn FnMut(&str);

/// The remote-execution channel. Implemented over ssh2; tests substitute
/// in-memory fakes at this seam.
pub trait Transport {
    fn exec(
        &self,
        target: &Target,
        credentials: &Credentials,
        command: &str,
        remaining_budget: Option<Duration>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<String, TransportError>;

    fn upload(
        &self,
        target: &Target,
        credentials: &Credentials,
        local: &Path,
        remote: &str,
    ) -> Result<(), TransportError>;

    fn download(
        &self,
        target: &Target,
        credentials: &Credentials,
        remote: &str,
    ) -> Result<String, TransportError>;
}
