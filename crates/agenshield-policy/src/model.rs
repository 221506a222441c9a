//! Policy data model.

use agenshield_core::protocol::OperationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What happens when a policy matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Deny,
    /// Denied synchronously, surfaced as an approval request to the daemon.
    Approval,
}

/// What kind of target the policy's patterns match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyTarget {
    Skill,
    Command,
    Url,
    Filesystem,
}

impl PolicyTarget {
    /// The target kind a given operation is checked against.
    pub fn for_operation(op: OperationKind) -> Option<Self> {
        Some(match op {
            OperationKind::Exec => PolicyTarget::Command,
            OperationKind::HttpRequest | OperationKind::OpenUrl => PolicyTarget::Url,
            OperationKind::FileRead | OperationKind::FileWrite | OperationKind::FileList => {
                PolicyTarget::Filesystem
            }
            OperationKind::SkillInstall | OperationKind::SkillUninstall => PolicyTarget::Skill,
            _ => return None,
        })
    }
}

/// A single declarative rule. `id` is an opaque unique string; disabled
/// policies evaluate as absent; higher priority beats lower, ties broken by
/// position in the set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "new_policy_id")]
    pub id: String,
    pub name: String,
    pub action: PolicyAction,
    pub target: PolicyTarget,
    pub patterns: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    /// Operations this policy applies to. Empty = all.
    #[serde(default)]
    pub operations: BTreeSet<OperationKind>,
}

fn new_policy_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_enabled() -> bool {
    true
}

impl Policy {
    pub fn new(
        name: impl Into<String>,
        action: PolicyAction,
        target: PolicyTarget,
        patterns: Vec<String>,
    ) -> Self {
        Self {
            id: new_policy_id(),
            name: name.into(),
            action,
            target,
            patterns,
            enabled: true,
            priority: 0,
            operations: BTreeSet::new(),
        }
    }

    /// Whether this policy participates in the evaluation of `op`.
    pub fn applies_to(&self, op: OperationKind) -> bool {
        self.enabled && (self.operations.is_empty() || self.operations.contains(&op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let p: Policy = serde_json::from_str(
            r#"{"name":"Block All","action":"deny","target":"command","patterns":["*"]}"#,
        )
        .unwrap();
        assert!(p.enabled);
        assert_eq!(p.priority, 0);
        assert!(p.operations.is_empty());
        assert!(!p.id.is_empty());
    }

    #[test]
    fn operations_filter() {
        let mut p = Policy::new(
            "x",
            PolicyAction::Deny,
            PolicyTarget::Url,
            vec!["*".into()],
        );
        assert!(p.applies_to(OperationKind::HttpRequest));
        p.operations.insert(OperationKind::OpenUrl);
        assert!(!p.applies_to(OperationKind::HttpRequest));
        assert!(p.applies_to(OperationKind::OpenUrl));
        p.enabled = false;
        assert!(!p.applies_to(OperationKind::OpenUrl));
    }
}
