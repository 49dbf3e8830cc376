//! Health checks registered per object type.

use crate::entry::Entry;
use serde::Serialize;
use std::fmt;

/// How urgently a finding should be addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational.
    Low,
    /// Should be fixed.
    Medium,
    /// Breaks functionality.
    High,
}

/// One problem reported by a lint rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    /// Stable identifier of the rule that fired.
    pub id: String,
    /// Severity.
    pub severity: Severity,
    /// Affected items (usually the entry DN).
    pub items: Vec<String>,
    /// What is wrong.
    pub detail: String,
    /// How to fix it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

impl LintFinding {
    /// Creates a finding about `entry`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        entry: &Entry,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            items: vec![entry.dn.to_string()],
            detail: detail.into(),
            fix: None,
        }
    }

    /// Attaches remediation advice.
    #[must_use]
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

impl fmt::Display for LintFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:?}] {}: {}",
            self.id,
            self.severity,
            self.items.join(", "),
            self.detail
        )
    }
}

/// Check evaluated against a freshly read entry.
pub type LintCheck = fn(&Entry) -> Option<LintFinding>;

/// A named lint check.
#[derive(Clone, Copy)]
pub struct LintRule {
    /// Short rule name, used in logs.
    pub name: &'static str,
    /// The check itself.
    pub check: LintCheck,
}

impl LintRule {
    /// Creates a rule.
    #[must_use]
    pub const fn new(name: &'static str, check: LintCheck) -> Self {
        Self { name, check }
    }
}

impl fmt::Debug for LintRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LintRule").field(&self.name).finish()
    }
}

/// Runs `rules` in order, collecting every finding.
#[must_use]
pub fn run_rules(rules: &[LintRule], entry: &Entry) -> Vec<LintFinding> {
    rules.iter().filter_map(|rule| (rule.check)(entry)).collect()
}
