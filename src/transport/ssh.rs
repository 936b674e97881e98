use super::audit::AuditLog;
use super::session::connect;
use super::{
    resolve_exec_timeout, Credentials, ProgressFn, Target, TimeoutPolicy, Transport,
    TransportError,
};
use crate::shared::now_secs;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// ssh2-backed transport. Commands run on a session channel; file transfer
/// goes through SFTP. One audit entry is appended per exec regardless of
/// outcome.
pub struct SshTransport {
    policy: TimeoutPolicy,
    audit: AuditLog,
}

impl SshTransport {
    pub fn new(policy: TimeoutPolicy, audit: AuditLog) -> Self {
        Self { policy, audit }
    }

    fn record_audit(&self, target: &Target, command: &str, result: &str) {
        // Auditing must never mask the exec result.
        let _ = self.audit.append(now_secs(), &target.addr(), command, result);
    }
}

impl Transport for SshTransport {
    fn exec(
        &self,
        target: &Target,
        credentials: &Credentials,
        command: &str,
        remaining_budget: Option<Duration>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<String, TransportError> {
        let timeout = resolve_exec_timeout(&self.policy, progress.is_some(), remaining_budget);
        let outcome = exec_once(target, credentials, command, timeout, progress);
        match &outcome {
            Ok(output) => self.record_audit(target, command, output),
            Err(err) => self.record_audit(target, command, &format!("error: {err}")),
        }
        outcome
    }

    fn upload(
        &self,
        target: &Target,
        credentials: &Credentials,
        local: &Path,
        remote: &str,
    ) -> Result<(), TransportError> {
        let session = connect(target, credentials, self.policy.default_timeout)?;
        let body = fs::read(local).map_err(|err| TransportError::Io {
            reason: format!("failed to read {}: {err}", local.display()),
        })?;
        let sftp = session.sftp().map_err(|err| TransportError::Connection {
            host: target.addr(),
            reason: err.to_string(),
        })?;
        let mut file = sftp
            .create(Path::new(remote))
            .map_err(|err| TransportError::Io {
                reason: format!("failed to create {remote}: {err}"),
            })?;
        file.write_all(&body).map_err(|err| TransportError::Io {
            reason: format!("failed to write {remote}: {err}"),
        })?;
        Ok(())
    }

    fn download(
        &self,
        target: &Target,
        credentials: &Credentials,
        remote: &str,
    ) -> Result<String, TransportError> {
        let session = connect(target, credentials, self.policy.default_timeout)?;
        let sftp = session.sftp().map_err(|err| TransportError::Connection {
            host: target.addr(),
            reason: err.to_string(),
        })?;
        let mut file = match sftp.open(Path::new(remote)) {
            Ok(file) => file,
            Err(err) => {
                let io_err: std::io::Error = err.into();
                if io_err.kind() == std::io::ErrorKind::NotFound {
                    return Err(TransportError::NotFound {
                        path: remote.to_string(),
                    });
                }
                return Err(TransportError::Io {
                    reason: format!("failed to open {remote}: {io_err}"),
                });
            }
        };
        let mut body = String::new();
        file.read_to_string(&mut body)
            .map_err(|err| TransportError::Io {
                reason: format!("failed to read {remote}: {err}"),
            })?;
        Ok(body)
    }
}

fn exec_once(
    target: &Target,
    credentials: &Credentials,
    command: &str,
    timeout: Duration,
    mut progress: Option<ProgressFn<'_>>,
) -> Result<String, TransportError> {
    let session = connect(target, credentials, timeout)?;
    let mut channel = session
        .channel_session()
        .map_err(|err| TransportError::Connection {
            host: target.addr(),
            reason: err.to_string(),
        })?;
    channel.exec(command).map_err(|err| TransportError::Io {
        reason: format!("exec failed: {err}"),
    })?;

    // stderr folded into the captured text; the classifier works on the
    // combined stream just like the remote agent's own log.
    let mut output = String::new();
    let started = Instant::now();
    let mut buf = [0u8; READ_CHUNK_BYTES];
    loop {
        if started.elapsed() > timeout {
            return Err(TransportError::Timeout {
                seconds: timeout.as_secs(),
            });
        }
        match channel.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => {
                let chunk = String::from_utf8_lossy(&buf[..read]);
                output.push_str(&chunk);
                if let Some(callback) = progress.as_mut() {
                    callback(&chunk);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                return Err(TransportError::Timeout {
                    seconds: timeout.as_secs(),
                });
            }
            Err(err) => {
                return Err(TransportError::Io {
                    reason: format!("read failed: {err}"),
                })
            }
        }
    }
    let mut stderr = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr);
    if !stderr.is_empty() {
        output.push_str(&stderr);
    }
    let _ = channel.wait_close();
    Ok(output)
}
