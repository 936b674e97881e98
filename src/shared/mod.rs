pub mod ids;
pub mod logging;

pub use ids::{validate_command_name, CommandName, ResourceId};

pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
