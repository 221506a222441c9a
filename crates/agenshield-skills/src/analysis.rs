//! Vulnerability analysis hook.
//!
//! Untrusted skills must pass analysis before they leave quarantine. The
//! default analyzer is a static pattern scan over the bundle's text files:
//! severity-ranked rules, comment lines skipped, anything above `High`
//! rejects the skill. The trait seam lets the daemon substitute a remote
//! analyzer without touching the watcher.

use crate::model::SkillSpec;
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One finding from the static scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub file: String,
    pub line: usize,
    pub description: String,
}

/// Analyzer verdict for a skill bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisVerdict {
    pub approved: bool,
    pub findings: Vec<Finding>,
}

/// Seam for vulnerability analysis of untrusted skills.
pub trait AnalysisHook: Send + Sync {
    fn analyze(&self, spec: &SkillSpec) -> Result<AnalysisVerdict>;
}

struct Rule {
    id: &'static str,
    pattern: &'static str,
    severity: Severity,
    description: &'static str,
}

/// Dangerous-pattern table. Rough by design: this is a gate for unreviewed
/// third-party bundles, not a linter.
const RULES: &[Rule] = &[
    Rule {
        id: "exec-eval",
        pattern: r"\beval\s*\(",
        severity: Severity::Critical,
        description: "dynamic code evaluation",
    },
    Rule {
        id: "exec-shell",
        pattern: r"(?:os\.system|subprocess\.|child_process|execSync)\s*\(",
        severity: Severity::High,
        description: "shell execution from script",
    },
    Rule {
        id: "net-raw",
        pattern: r"(?:socket\.socket|net\.connect|new\s+WebSocket)\s*\(",
        severity: Severity::High,
        description: "raw network connection",
    },
    Rule {
        id: "fs-home-write",
        pattern: r#"(?:open|writeFile|writeFileSync)\s*\(\s*['"](?:~|/Users/|/home/)"#,
        severity: Severity::High,
        description: "write outside the skill directory",
    },
    Rule {
        id: "cred-read",
        pattern: r"\.(?:ssh|aws|gnupg|kube|docker)/",
        severity: Severity::Critical,
        description: "credential directory access",
    },
    Rule {
        id: "env-dump",
        pattern: r"(?:os\.environ|process\.env)\b",
        severity: Severity::Medium,
        description: "bulk environment read",
    },
    Rule {
        id: "b64-decode-exec",
        pattern: r"(?:b64decode|atob|from_base64)\s*\(",
        severity: Severity::Medium,
        description: "encoded payload decoding",
    },
];

fn is_comment_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('#') || t.starts_with("//") || t.starts_with(';')
}

/// Default analyzer: regex rules over every non-base64 file in the bundle.
pub struct StaticScanAnalyzer {
    rules: Vec<(&'static Rule, regex::Regex)>,
    /// Findings at or above this severity reject the skill.
    reject_at: Severity,
}

impl Default for StaticScanAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticScanAnalyzer {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|rule| {
                regex::Regex::new(rule.pattern)
                    .map(|re| (rule, re))
                    .map_err(|e| {
                        tracing::warn!(rule = rule.id, error = %e, "failed to compile scan rule");
                        e
                    })
                    .ok()
            })
            .collect();
        Self {
            rules,
            reject_at: Severity::High,
        }
    }

    pub fn reject_at(mut self, severity: Severity) -> Self {
        self.reject_at = severity;
        self
    }
}

impl AnalysisHook for StaticScanAnalyzer {
    fn analyze(&self, spec: &SkillSpec) -> Result<AnalysisVerdict> {
        let mut findings = Vec::new();
        for file in &spec.files {
            if file.base64 {
                continue;
            }
            for (line_idx, line) in file.content.lines().enumerate() {
                if is_comment_line(line) {
                    continue;
                }
                for (rule, re) in &self.rules {
                    if re.is_match(line) {
                        findings.push(Finding {
                            rule_id: rule.id.to_string(),
                            severity: rule.severity,
                            file: file.name.clone(),
                            line: line_idx + 1,
                            description: rule.description.to_string(),
                        });
                    }
                }
            }
        }
        let approved = findings.iter().all(|f| f.severity < self.reject_at);
        if !approved {
            tracing::warn!(
                skill = %spec.slug,
                findings = findings.len(),
                "skill rejected by static analysis"
            );
        }
        Ok(AnalysisVerdict { approved, findings })
    }
}

/// Trusted-source bypass.
pub struct TrustingAnalyzer;

impl AnalysisHook for TrustingAnalyzer {
    fn analyze(&self, _spec: &SkillSpec) -> Result<AnalysisVerdict> {
        Ok(AnalysisVerdict {
            approved: true,
            findings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SkillFile;

    fn spec_with(content: &str) -> SkillSpec {
        SkillSpec {
            slug: "probe".into(),
            files: vec![
                SkillFile {
                    name: "SKILL.md".into(),
                    content: "# probe".into(),
                    mode: None,
                    base64: false,
                },
                SkillFile {
                    name: "main.py".into(),
                    content: content.into(),
                    mode: None,
                    base64: false,
                },
            ],
            version: None,
            trusted: false,
            source_id: None,
        }
    }

    #[test]
    fn clean_skill_is_approved() {
        let verdict = StaticScanAnalyzer::new()
            .analyze(&spec_with("print('hello')\n"))
            .unwrap();
        assert!(verdict.approved);
        assert!(verdict.findings.is_empty());
    }

    #[test]
    fn eval_is_critical() {
        let verdict = StaticScanAnalyzer::new()
            .analyze(&spec_with("eval(input())\n"))
            .unwrap();
        assert!(!verdict.approved);
        assert_eq!(verdict.findings[0].severity, Severity::Critical);
    }

    #[test]
    fn ssh_dir_access_rejected() {
        let verdict = StaticScanAnalyzer::new()
            .analyze(&spec_with("open('/Users/x/.ssh/id_rsa')\n"))
            .unwrap();
        assert!(!verdict.approved);
        assert!(verdict.findings.iter().any(|f| f.rule_id == "cred-read"));
    }

    #[test]
    fn comments_are_skipped() {
        let verdict = StaticScanAnalyzer::new()
            .analyze(&spec_with("# eval( in a comment is fine\n"))
            .unwrap();
        assert!(verdict.approved);
    }

    #[test]
    fn medium_findings_alone_pass_default_gate() {
        let verdict = StaticScanAnalyzer::new()
            .analyze(&spec_with("print(os.environ)\n"))
            .unwrap();
        assert!(verdict.approved);
        assert!(!verdict.findings.is_empty());
    }

    #[test]
    fn reject_threshold_is_configurable() {
        let verdict = StaticScanAnalyzer::new()
            .reject_at(Severity::Medium)
            .analyze(&spec_with("print(os.environ)\n"))
            .unwrap();
        assert!(!verdict.approved);
    }
}
