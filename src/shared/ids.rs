use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Numeric identifier of an orchestration target (a machine or an
/// application instance hosted on one). The backing entity store keys
/// resources by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(i64);

impl ResourceId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("resource id must be non-empty".to_string());
        }
        trimmed
            .parse::<i64>()
            .map(Self)
            .map_err(|_| format!("resource id must be numeric, got `{raw}`"))
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

pub fn validate_command_name(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("command name must be non-empty".to_string());
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
    {
        return Ok(());
    }
    Err("command name must use only ASCII letters, digits, '-', '_' or '.'".to_string())
}

/// A dispatched command identifier. Uniquified names carry either a trailing
/// `_<unix timestamp>` suffix or `---<argument>---<suffix>` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CommandName(String);

impl CommandName {
    pub fn parse(raw: &str) -> Result<Self, String> {
        validate_command_name(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::borrow::Borrow<str> for CommandName {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl<'de> Deserialize<'de> for CommandName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .map_err(|err| D::Error::custom(format!("invalid command name `{raw}`: {err}")))
    }
}
