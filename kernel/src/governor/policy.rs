//! Autonomy mode and risk-gated action permission.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Manual,
    #[default]
    Supervised,
    Autonomous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub require_approval: Vec<String>,
    pub allowed_tools: Vec<String>,
    pub blocked_tools: Vec<String>,
    pub max_risk_per_action: f64,
    pub auto_approve_below_risk: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            require_approval: Vec::new(),
            allowed_tools: Vec::new(),
            blocked_tools: Vec::new(),
            max_risk_per_action: 1.0,
            auto_approve_below_risk: 0.2,
        }
    }
}

/// A glob-lite match: `*` matches anything; a trailing `*` matches as a prefix; otherwise exact.
fn pattern_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    pattern == value
}

impl RiskPolicy {
    pub fn requires_approval(&self, action_type: &str) -> bool {
        self.require_approval.iter().any(|p| pattern_matches(p, action_type))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: String,
    pub action: String,
    pub risk_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PermissionDecision {
    Allow,
    Deny,
    RequiresApproval(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_pattern_matches_everything() {
        assert!(pattern_matches("*", "anything"));
    }

    #[test]
    fn prefix_pattern_matches_prefix() {
        assert!(pattern_matches("fs:*", "fs:write"));
        assert!(!pattern_matches("fs:*", "net:fetch"));
    }

    #[test]
    fn exact_pattern_matches_exactly() {
        assert!(pattern_matches("delete_file", "delete_file"));
        assert!(!pattern_matches("delete_file", "delete_files"));
    }

    #[test]
    fn requires_approval_checks_all_patterns() {
        let policy = RiskPolicy {
            require_approval: vec!["fs:*".to_string()],
            ..Default::default()
        };
        assert!(policy.requires_approval("fs:write"));
        assert!(!policy.requires_approval("net:fetch"));
    }

    #[test]
    fn mode_defaults_to_supervised() {
        assert_eq!(Mode::default(), Mode::Supervised);
    }
}
