//! Merge strategies for policies attached along a topology path
//!
//! A policy exposes its rules as a map keyed by `<group>#<id>`. Merging two
//! policies of the same kind either picks one of them whole (atomic) or
//! unions their rule maps (merge). In both cases every rule of the result is
//! stamped with the locator of the policy that defined it, unless an earlier
//! merge step already stamped it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kuadrant_common::HasApiResource;

/// Key of the top-level `when` predicates of a policy
pub const TOP_LEVEL_PREDICATES_KEY: &str = "predicates#";

/// Rules of a policy, keyed by `<group>#<id>`
pub type Rules<R> = BTreeMap<String, MergeableRule<R>>;

/// Build a rule key
pub fn rule_key(group: &str, id: &str) -> String {
    format!("{}#{}", group, id)
}

/// The id part of a rule key (empty for singleton rules)
pub fn rule_id(key: &str) -> &str {
    key.split_once('#').map_or(key, |(_, id)| id)
}

/// A rule together with the locator of the policy that defined it
#[derive(Clone, Debug, PartialEq)]
pub struct MergeableRule<R> {
    /// Kind-specific rule payload
    pub spec: R,
    /// Locator of the defining policy; empty until stamped
    pub source: String,
}

impl<R> MergeableRule<R> {
    /// Create a rule
    pub fn new(spec: R, source: impl Into<String>) -> Self {
        Self {
            spec,
            source: source.into(),
        }
    }

    /// Stamp the rule with `source` unless it already carries one
    pub fn with_default_source(mut self, source: &str) -> Self {
        if self.source.is_empty() {
            self.source = source.to_string();
        }
        self
    }
}

/// How two policies of the same kind combine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Target wins as a whole unless it is empty
    AtomicDefaults,
    /// Source wins as a whole
    AtomicOverrides,
    /// Target rules win; source fills in missing keys
    RuleDefaults,
    /// Source rules win; target fills in missing keys
    RuleOverrides,
}

impl MergeStrategy {
    /// Combine `source` into `target`
    ///
    /// Neither input is modified; the result is a fresh policy.
    pub fn apply<P: MergeablePolicy>(self, source: &P, target: &P) -> P {
        match self {
            MergeStrategy::AtomicDefaults => {
                if target.is_empty() {
                    stamped(source)
                } else {
                    stamped(target)
                }
            }
            MergeStrategy::AtomicOverrides => stamped(source),
            MergeStrategy::RuleDefaults => union(target, source),
            MergeStrategy::RuleOverrides => union(source, target),
        }
    }
}

/// Copy of `policy` with every unstamped rule attributed to it
fn stamped<P: MergeablePolicy>(policy: &P) -> P {
    let locator = policy.locator().to_string();
    let rules = policy
        .rules()
        .into_iter()
        .map(|(key, rule)| (key, rule.with_default_source(&locator)))
        .collect();

    let mut result = policy.clone();
    result.set_rules(rules);
    result
}

/// Copy of `winner` holding its own rules plus the rules of `other` whose
/// keys it lacks
fn union<P: MergeablePolicy>(winner: &P, other: &P) -> P {
    let winner_locator = winner.locator().to_string();
    let other_locator = other.locator().to_string();

    let mut rules: Rules<P::Rule> = winner
        .rules()
        .into_iter()
        .map(|(key, rule)| (key, rule.with_default_source(&winner_locator)))
        .collect();
    for (key, rule) in other.rules() {
        rules
            .entry(key)
            .or_insert_with(|| rule.with_default_source(&other_locator));
    }

    let mut result = winner.clone();
    result.set_rules(rules);
    result
}

/// A policy whose rules can be merged with other policies of its kind
pub trait MergeablePolicy: HasApiResource + Clone {
    /// Closed set of rule payloads for this kind
    type Rule: Clone;

    /// Strategy declared by the policy's active form
    fn merge_strategy(&self) -> MergeStrategy;

    /// Rules of the active form, with their recorded sources
    fn rules(&self) -> Rules<Self::Rule>;

    /// Replace every rule of the active form
    ///
    /// All rule-bearing fields are cleared first, so `set_rules(rules())`
    /// reproduces the policy's rule content.
    fn set_rules(&mut self, rules: Rules<Self::Rule>);

    /// Whether the policy enforces nothing
    fn is_empty(&self) -> bool;

    /// Creation time, used to order policies attached to the same object
    fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.metadata().creation_timestamp.as_ref().map(|t| t.0)
    }

    /// Merge a less specific policy into this one
    ///
    /// The strategy declared by `other` decides: its defaults yield to this
    /// policy, its overrides replace it.
    fn merge(&self, other: &Self) -> Self {
        other.merge_strategy().apply(other, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        Limit, MergeableSpec, Rate, RateLimitPolicy, RateLimitPolicyRules, RateLimitPolicySpec,
        RateLimitRule, Strategy, TargetRef,
    };
    use kuadrant_common::meta;
    use rstest::rstest;

    fn limits(names: &[(&str, i64)]) -> RateLimitPolicyRules {
        RateLimitPolicyRules {
            limits: names
                .iter()
                .map(|(name, hits)| {
                    (
                        name.to_string(),
                        Limit {
                            rates: vec![Rate::new(*hits, "1m")],
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            when: vec![],
        }
    }

    fn policy(name: &str, form: &str, rules: RateLimitPolicyRules) -> RateLimitPolicy {
        let mut spec = RateLimitPolicySpec {
            target_ref: TargetRef::gateway("gw"),
            ..Default::default()
        };
        let block = |strategy| Some(MergeableSpec { strategy, rules: rules.clone() });
        match form {
            "bare" => spec.rules = rules.clone(),
            "defaults-atomic" => spec.defaults = block(Strategy::Atomic),
            "defaults-merge" => spec.defaults = block(Strategy::Merge),
            "overrides-atomic" => spec.overrides = block(Strategy::Atomic),
            "overrides-merge" => spec.overrides = block(Strategy::Merge),
            other => panic!("unknown form {}", other),
        }
        RateLimitPolicy {
            metadata: meta(name, "ns"),
            spec,
        }
    }

    fn hits(policy: &RateLimitPolicy, key: &str) -> i64 {
        match &policy.rules()[key].spec {
            RateLimitRule::Limit(limit) => limit.rates[0].limit,
            other => panic!("unexpected rule {:?}", other),
        }
    }

    fn sources(policy: &RateLimitPolicy) -> Vec<(String, String)> {
        policy
            .rules()
            .into_iter()
            .map(|(k, r)| (k, r.source))
            .collect()
    }

    #[test]
    fn test_rule_key_and_id() {
        assert_eq!(rule_key("limits", "global"), "limits#global");
        assert_eq!(rule_id("limits#global"), "global");
        assert_eq!(rule_id(TOP_LEVEL_PREDICATES_KEY), "");
        assert_eq!(rule_id("rules.response.unauthorized#"), "");
    }

    #[test]
    fn test_with_default_source_keeps_existing_stamp() {
        let rule = MergeableRule::new(1, "first").with_default_source("second");
        assert_eq!(rule.source, "first");
        let rule = MergeableRule::new(1, "").with_default_source("second");
        assert_eq!(rule.source, "second");
    }

    #[rstest]
    #[case::bare("bare", MergeStrategy::AtomicDefaults)]
    #[case::defaults_atomic("defaults-atomic", MergeStrategy::AtomicDefaults)]
    #[case::defaults_merge("defaults-merge", MergeStrategy::RuleDefaults)]
    #[case::overrides_atomic("overrides-atomic", MergeStrategy::AtomicOverrides)]
    #[case::overrides_merge("overrides-merge", MergeStrategy::RuleOverrides)]
    fn test_strategy_resolution(#[case] form: &str, #[case] want: MergeStrategy) {
        assert_eq!(policy("p", form, limits(&[("a", 1)])).merge_strategy(), want);
    }

    #[test]
    fn story_atomic_defaults_non_empty_target_wins() {
        let source = policy("source", "bare", limits(&[("a", 1)]));
        let target = policy("target", "bare", limits(&[("b", 2)]));

        let merged = MergeStrategy::AtomicDefaults.apply(&source, &target);
        assert_eq!(merged.name(), "target");
        assert_eq!(
            sources(&merged),
            vec![(
                "limits#b".to_string(),
                "ratelimitpolicy.kuadrant.io:ns/target".to_string()
            )]
        );

        // An empty target falls back to the source
        let empty = policy("empty", "bare", limits(&[]));
        let merged = MergeStrategy::AtomicDefaults.apply(&source, &empty);
        assert_eq!(merged.name(), "source");
        assert_eq!(hits(&merged, "limits#a"), 1);
    }

    #[test]
    fn story_atomic_overrides_source_always_wins() {
        let source = policy("source", "overrides-atomic", limits(&[("a", 1)]));
        let target = policy("target", "bare", limits(&[("a", 9), ("b", 2)]));

        let merged = MergeStrategy::AtomicOverrides.apply(&source, &target);
        assert_eq!(merged.name(), "source");
        assert_eq!(hits(&merged, "limits#a"), 1);
        assert!(!merged.rules().contains_key("limits#b"));
    }

    #[rstest]
    #[case::rule_defaults(MergeStrategy::RuleDefaults, 20, "target")]
    #[case::rule_overrides(MergeStrategy::RuleOverrides, 10, "source")]
    fn story_rule_strategies_union_keys(
        #[case] strategy: MergeStrategy,
        #[case] b_hits: i64,
        #[case] b_owner: &str,
    ) {
        let source = policy("source", "defaults-merge", limits(&[("a", 1), ("b", 10)]));
        let target = policy("target", "bare", limits(&[("b", 20), ("c", 3)]));

        let merged = strategy.apply(&source, &target);

        let keys: Vec<String> = merged.rules().into_keys().collect();
        assert_eq!(keys, vec!["limits#a", "limits#b", "limits#c"]);
        assert_eq!(hits(&merged, "limits#b"), b_hits);

        let rules = merged.rules();
        assert_eq!(rules["limits#a"].source, "ratelimitpolicy.kuadrant.io:ns/source");
        assert_eq!(
            rules["limits#b"].source,
            format!("ratelimitpolicy.kuadrant.io:ns/{}", b_owner)
        );
        assert_eq!(rules["limits#c"].source, "ratelimitpolicy.kuadrant.io:ns/target");
    }

    #[test]
    fn story_first_stamp_wins_across_merges() {
        let gateway = policy("gateway", "defaults-merge", limits(&[("a", 1)]));
        let listener = policy("listener", "defaults-merge", limits(&[("b", 2)]));
        let route = policy("route", "bare", limits(&[("c", 3)]));

        let step = route.merge(&route).merge(&listener).merge(&gateway);

        let rules = step.rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules["limits#a"].source, "ratelimitpolicy.kuadrant.io:ns/gateway");
        assert_eq!(rules["limits#b"].source, "ratelimitpolicy.kuadrant.io:ns/listener");
        assert_eq!(rules["limits#c"].source, "ratelimitpolicy.kuadrant.io:ns/route");
    }

    #[test]
    fn test_merge_uses_less_specific_policy_strategy() {
        let gateway_defaults = policy("gw", "defaults-atomic", limits(&[("a", 1)]));
        let gateway_overrides = policy("gw", "overrides-atomic", limits(&[("a", 1)]));
        let route = policy("route", "bare", limits(&[("a", 5)]));

        assert_eq!(hits(&route.merge(&gateway_defaults), "limits#a"), 5);
        assert_eq!(hits(&route.merge(&gateway_overrides), "limits#a"), 1);
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let source = policy("source", "overrides-merge", limits(&[("a", 1)]));
        let target = policy("target", "bare", limits(&[("b", 2)]));
        let before = (source.clone(), target.clone());

        let _ = target.merge(&source);

        assert_eq!(source.spec, before.0.spec);
        assert_eq!(target.spec, before.1.spec);
    }

    #[test]
    fn test_self_merge_is_idempotent_on_content() {
        let route = policy("route", "bare", limits(&[("a", 1), ("b", 2)]));
        let merged = route.merge(&route);
        assert_eq!(merged.spec.rules, route.spec.rules);
        assert!(merged
            .rules()
            .values()
            .all(|r| r.source == "ratelimitpolicy.kuadrant.io:ns/route"));
    }
}
