use std::collections::{BTreeMap, BTreeSet};

/// Classification of raw captured output. The transport has no exit-status
/// channel, so success is inferred from known output markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Output matched no known pattern. Callers treat this as failure.
    Ambiguous,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Per-action-kind registry of positive markers plus a global list of fatal
/// markers that override a positive match back to failure.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    positives: BTreeMap<String, Vec<String>>,
    negatives: Vec<String>,
    allow_empty: BTreeSet<String>,
    negative_override_enabled: bool,
}

impl PatternRegistry {
    pub fn new(negative_override_enabled: bool) -> Self {
        Self {
            positives: BTreeMap::new(),
            negatives: Vec::new(),
            allow_empty: BTreeSet::new(),
            negative_override_enabled,
        }
    }

    /// Registry seeded with the markers the stock remote scripts emit.
    pub fn with_defaults(negative_override_enabled: bool) -> Self {
        let mut registry = Self::new(negative_override_enabled);
        registry.register_success("prepare_server", "server preparation complete");
        registry.register_success("install_app", "installation finished");
        registry.register_success("install_app", "has been installed");
        registry.register_success("manage_https", "SSL has been enabled for");
        registry.register_success("manage_https", "certificate renewed");
        registry.register_success("backup", "backup archive written");
        registry.register_success("restore", "restore complete");
        registry.register_success("replace_domain", "domain replaced");
        registry.register_negative("Could not get lock /var/lib/dpkg/lock");
        registry.register_negative("E: Unable to acquire the dpkg frontend lock");
        registry.register_negative("journalctl -xe");
        registry.register_negative("PHP Fatal error");
        registry.register_negative("Traceback (most recent call last)");
        // Status probes legitimately print nothing when the subject is absent.
        registry.allow_empty_output("remove_app");
        registry.allow_empty_output("clear_cache");
        registry
    }

    pub fn register_success(&mut self, action_kind: &str, marker: &str) {
        self.positives
            .entry(action_kind.to_string())
            .or_default()
            .push(marker.to_string());
    }

    pub fn register_negative(&mut self, marker: &str) {
        self.negatives.push(marker.to_string());
    }

    pub fn allow_empty_output(&mut self, action_kind: &str) {
        self.allow_empty.insert(action_kind.to_string());
    }

    pub fn set_negative_override_enabled(&mut self, enabled: bool) {
        self.negative_override_enabled = enabled;
    }

    fn matches_negative(&self, output: &str) -> bool {
        self.negatives.iter().any(|marker| output.contains(marker))
    }

    pub fn classify(&self, action_kind: &str, output: &str) -> Outcome {
        if output.trim().is_empty() {
            return if self.allow_empty.contains(action_kind) {
                Outcome::Success
            } else {
                Outcome::Failure
            };
        }

        let positive = self
            .positives
            .get(action_kind)
            .map(|markers| markers.iter().any(|marker| output.contains(marker)))
            .unwrap_or(false);

        if positive {
            if self.negative_override_enabled && self.matches_negative(output) {
                return Outcome::Failure;
            }
            return Outcome::Success;
        }

        if self.matches_negative(output) {
            return Outcome::Failure;
        }
        Outcome::Ambiguous
    }
}
