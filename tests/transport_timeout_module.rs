use shipwright::config::Settings;
use shipwright::transport::{resolve_exec_timeout, AuditLog, TimeoutPolicy, TransportError};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn progress_callback_forces_the_short_fixed_timeout() {
    let policy = TimeoutPolicy::default();
    let timeout = resolve_exec_timeout(&policy, true, Some(Duration::from_secs(600)));
    assert_eq!(timeout, Duration::from_secs(15));
}

#[test]
fn known_budget_is_reduced_by_the_safety_margin() {
    let policy = TimeoutPolicy::default();
    let timeout = resolve_exec_timeout(&policy, false, Some(Duration::from_secs(120)));
    assert_eq!(timeout, Duration::from_secs(115));
}

#[test]
fn tiny_budget_never_collapses_below_one_second() {
    let policy = TimeoutPolicy::default();
    let timeout = resolve_exec_timeout(&policy, false, Some(Duration::from_secs(3)));
    assert_eq!(timeout, Duration::from_secs(1));
}

#[test]
fn unknown_budget_falls_back_to_the_default() {
    let policy = TimeoutPolicy::default();
    let timeout = resolve_exec_timeout(&policy, false, None);
    assert_eq!(timeout, Duration::from_secs(29));
}

#[test]
fn settings_overrides_reach_the_timeout_policy() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("settings.yaml");
    fs::write(
        &path,
        "exec_default_timeout_seconds: 60\n\
         exec_progress_timeout_seconds: 8\n\
         exec_safety_margin_seconds: 10\n",
    )
    .expect("write");

    let settings = Settings::load(&path).expect("load");
    let policy = TimeoutPolicy::from_settings(&settings);
    assert_eq!(policy.default_timeout, Duration::from_secs(60));
    assert_eq!(policy.progress_timeout, Duration::from_secs(8));
    assert_eq!(policy.safety_margin, Duration::from_secs(10));

    assert_eq!(resolve_exec_timeout(&policy, true, None), Duration::from_secs(8));
    assert_eq!(resolve_exec_timeout(&policy, false, None), Duration::from_secs(60));
    assert_eq!(
        resolve_exec_timeout(&policy, false, Some(Duration::from_secs(120))),
        Duration::from_secs(110)
    );
}

#[test]
fn connection_and_timeout_errors_are_transient() {
    assert!(TransportError::Connection {
        host: "203.0.113.9:22".to_string(),
        reason: "refused".to_string()
    }
    .is_transient());
    assert!(TransportError::Timeout { seconds: 29 }.is_transient());
    assert!(!TransportError::NotFound {
        path: "/var/log/x".to_string()
    }
    .is_transient());
    assert!(!TransportError::Io {
        reason: "short read".to_string()
    }
    .is_transient());
}

#[test]
fn audit_log_keeps_every_exchange_newest_first() {
    let tmp = tempdir().expect("tempdir");
    let audit = AuditLog::open(&tmp.path().join("state.db")).expect("open");

    audit
        .append(100, "203.0.113.9:22", "uptime", "up 3 days")
        .expect("append");
    audit
        .append(110, "203.0.113.9:22", "whoami", "error: connection refused")
        .expect("append");

    let entries = audit.recent(10).expect("recent");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].command, "whoami");
    assert_eq!(entries[0].result, "error: connection refused");
    assert_eq!(entries[1].command, "uptime");
}
