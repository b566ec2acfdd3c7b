//! Validation issues collected during a compilation
//!
//! Issues never abort a compilation. They are grouped by the policy kind
//! whose environment rejected the expression and the topology path the
//! expression was compiled for.

use std::collections::BTreeMap;
use std::fmt;

use kuadrant_policy::PolicyKind;

use crate::validator::CelError;

/// One rejected expression
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    /// Kind whose environment was used
    pub kind: PolicyKind,
    /// Topology path the expression belongs to
    pub path_id: String,
    /// The expression as written
    pub expression: String,
    /// Why it was rejected
    pub error: CelError,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {} ({})",
            self.kind, self.path_id, self.error, self.expression
        )
    }
}

/// Issues keyed by (policy kind, path id)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssueCollection {
    issues: BTreeMap<(PolicyKind, String), Vec<Issue>>,
}

impl IssueCollection {
    /// An empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rejected expression
    pub fn add(
        &mut self,
        kind: PolicyKind,
        path_id: impl Into<String>,
        expression: impl Into<String>,
        error: CelError,
    ) {
        let path_id = path_id.into();
        self.issues
            .entry((kind, path_id.clone()))
            .or_default()
            .push(Issue {
                kind,
                path_id,
                expression: expression.into(),
                error,
            });
    }

    /// Issues recorded for a kind on a path
    pub fn get(&self, kind: PolicyKind, path_id: &str) -> &[Issue] {
        self.issues
            .get(&(kind, path_id.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Move every issue of `other` into this collection
    pub fn extend(&mut self, other: IssueCollection) {
        for (key, issues) in other.issues {
            self.issues.entry(key).or_default().extend(issues);
        }
    }

    /// Whether no issue was recorded
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Total number of issues
    pub fn len(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }

    /// Every issue, ordered by kind then path id
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undeclared(name: &str) -> CelError {
        CelError::UndeclaredReference {
            name: name.to_string(),
        }
    }

    #[test]
    fn story_issues_grouped_by_kind_and_path() {
        let mut issues = IssueCollection::new();
        issues.add(PolicyKind::RateLimit, "gw#http|r#rule-1", "x == 1", undeclared("x"));
        issues.add(PolicyKind::RateLimit, "gw#http|r#rule-1", "y == 1", undeclared("y"));
        issues.add(PolicyKind::Auth, "gw#http|r#rule-1", "z == 1", undeclared("z"));

        assert_eq!(issues.len(), 3);
        assert_eq!(issues.get(PolicyKind::RateLimit, "gw#http|r#rule-1").len(), 2);
        assert_eq!(issues.get(PolicyKind::Auth, "gw#http|r#rule-1").len(), 1);
        assert!(issues.get(PolicyKind::Auth, "other").is_empty());

        // Auth sorts before RateLimit
        let first = issues.iter().next().unwrap();
        assert_eq!(first.expression, "z == 1");
        assert_eq!(
            first.to_string(),
            "AuthPolicy [gw#http|r#rule-1]: undeclared reference to 'z' (z == 1)"
        );
    }

    #[test]
    fn test_extend_merges_groups() {
        let mut a = IssueCollection::new();
        a.add(PolicyKind::Auth, "p", "x", undeclared("x"));
        let mut b = IssueCollection::new();
        b.add(PolicyKind::Auth, "p", "y", undeclared("y"));

        a.extend(b);
        assert_eq!(a.get(PolicyKind::Auth, "p").len(), 2);
        assert!(!a.is_empty());
        assert!(IssueCollection::new().is_empty());
    }
}
