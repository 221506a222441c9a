//! Priority-ordered policy evaluation with hot reload.
//!
//! The active policy set lives behind a reader-writer lock as an immutable
//! `Arc` slice: evaluation clones the Arc and never touches the lock again,
//! writers swap the whole slice. A request therefore sees either the old or
//! the new set in its entirety, never a torn mix.

use crate::command_match::command_matches;
use crate::fs_match::path_matches;
use crate::model::{Policy, PolicyAction, PolicyTarget};
use crate::url_match::url_matches;
use agenshield_core::protocol::OperationKind;
use std::sync::{Arc, RwLock};

/// Outcome of evaluating one operation+target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Id of the matching policy, if any.
    pub policy_id: Option<String>,
    /// Name of the matching policy, if any.
    pub policy_name: Option<String>,
    /// Set when the matching policy's action is `approval`: the caller is
    /// expected to surface an approval event while treating the request as
    /// denied.
    pub requires_approval: bool,
}

impl Decision {
    fn default_decision(fail_open: bool) -> Self {
        Self {
            allowed: fail_open,
            policy_id: None,
            policy_name: None,
            requires_approval: false,
        }
    }
}

/// Slug glob: `*` matches any run of characters, everything else is literal.
fn skill_matches(pattern: &str, target: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == target;
    }
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            c if "\\.+()[]{}|^$?".contains(c) => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
    }
    re.push('$');
    regex::Regex::new(&re)
        .map(|r| r.is_match(target))
        .unwrap_or(false)
}

fn pattern_matches(target_kind: PolicyTarget, pattern: &str, target: &str) -> bool {
    match target_kind {
        PolicyTarget::Url => url_matches(pattern, target),
        PolicyTarget::Command => command_matches(pattern, target),
        PolicyTarget::Filesystem => path_matches(pattern, target),
        PolicyTarget::Skill => skill_matches(pattern, target),
    }
}

/// The broker's policy evaluator. Cheap to share behind an `Arc`.
pub struct PolicyEngine {
    policies: RwLock<Arc<Vec<Policy>>>,
    fail_open: bool,
}

impl PolicyEngine {
    pub fn new(policies: Vec<Policy>, fail_open: bool) -> Self {
        Self {
            policies: RwLock::new(Arc::new(policies)),
            fail_open,
        }
    }

    /// Atomically replace the active policy set.
    pub fn replace(&self, policies: Vec<Policy>) {
        let mut guard = self
            .policies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(policies);
    }

    /// Snapshot of the active set (for the UI and diagnostics).
    pub fn snapshot(&self) -> Arc<Vec<Policy>> {
        self.policies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Evaluate one operation against its normalised target. Pure with
    /// respect to the snapshot taken at entry.
    pub fn evaluate(&self, op: OperationKind, target: &str) -> Decision {
        let Some(target_kind) = PolicyTarget::for_operation(op) else {
            // Control-plane operations (ping, secrets_sync, ...) are not
            // policy-scoped.
            return Decision::default_decision(true);
        };

        let snapshot = self.snapshot();
        let mut applicable: Vec<&Policy> = snapshot
            .iter()
            .filter(|p| p.applies_to(op) && p.target == target_kind)
            .collect();
        // Stable sort keeps first-in-set order for equal priorities.
        applicable.sort_by_key(|p| std::cmp::Reverse(p.priority));

        for policy in applicable {
            for pattern in &policy.patterns {
                if pattern_matches(target_kind, pattern, target) {
                    let decision = Decision {
                        allowed: policy.action == PolicyAction::Allow,
                        policy_id: Some(policy.id.clone()),
                        policy_name: Some(policy.name.clone()),
                        requires_approval: policy.action == PolicyAction::Approval,
                    };
                    tracing::debug!(
                        policy = %policy.name,
                        target = %target,
                        allowed = decision.allowed,
                        "policy matched"
                    );
                    return decision;
                }
            }
        }

        Decision::default_decision(self.fail_open)
    }
}
