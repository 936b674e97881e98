use chrono::{TimeZone, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Unix seconds rendered as the engine log's `ts=` value.
pub fn log_stamp(now: i64) -> String {
    Utc.timestamp_opt(now, 0)
        .single()
        .map(|stamp| stamp.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| now.to_string())
}

pub fn engine_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/engine.log")
}

pub fn append_engine_log_line(state_root: &Path, line: &str) -> std::io::Result<()> {
    let path = engine_log_path(state_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "{line}")
}
