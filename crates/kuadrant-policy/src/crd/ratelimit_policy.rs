//! RateLimitPolicy Custom Resource Definition
//!
//! A RateLimitPolicy declares named limits. Each limit has one or more rates
//! (`limit` hits per `window`), counter expressions that partition the
//! counters, and optional predicates that gate when the limit applies.
//!
//! ```yaml
//! apiVersion: kuadrant.io/v1
//! kind: RateLimitPolicy
//! metadata:
//!   name: toystore-rl
//!   namespace: toystore
//! spec:
//!   targetRef:
//!     group: gateway.networking.k8s.io
//!     kind: HTTPRoute
//!     name: toystore
//!   limits:
//!     per-user:
//!       rates:
//!         - limit: 50
//!           window: 1m
//!       counters:
//!         - expression: auth.identity.username
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{impl_policy_forms, MergeableSpec, TargetRef, WhenPredicate};
use crate::merge::{
    rule_id, rule_key, MergeStrategy, MergeablePolicy, MergeableRule, Rules,
    TOP_LEVEL_PREDICATES_KEY,
};
use kuadrant_common::{Error, HasApiResource, Result};

const LIMITS_GROUP: &str = "limits";

/// RateLimitPolicy spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kuadrant.io",
    version = "v1",
    kind = "RateLimitPolicy",
    plural = "ratelimitpolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicySpec {
    /// Gateway API object the policy attaches to
    pub target_ref: TargetRef,

    /// Limits that apply unless a more specific policy says otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<MergeableSpec<RateLimitPolicyRules>>,

    /// Limits that win over every more specific policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<MergeableSpec<RateLimitPolicyRules>>,

    /// Bare limits (implicit atomic defaults)
    #[serde(flatten)]
    pub rules: RateLimitPolicyRules,

    /// Locator of the policy that defined each rule, keyed by rule key
    #[serde(skip)]
    #[schemars(skip)]
    pub provenance: BTreeMap<String, String>,
}

impl_policy_forms!(RateLimitPolicySpec, RateLimitPolicyRules);

/// Rule-bearing fields of a RateLimitPolicy body
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicyRules {
    /// Named limits
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Limit>,

    /// Top-level predicates gating every limit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenPredicate>,
}

/// A named limit
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Limit {
    /// Rates enforced by this limit
    #[serde(default)]
    pub rates: Vec<Rate>,

    /// CEL expressions whose values partition the counters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<Counter>,

    /// Predicates gating this limit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenPredicate>,
}

/// Hits allowed per time window
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Rate {
    /// Maximum number of hits
    pub limit: i64,
    /// Window as a duration string (e.g. "1m", "1h30m")
    pub window: String,
}

impl Rate {
    /// Create a rate
    pub fn new(limit: i64, window: impl Into<String>) -> Self {
        Self {
            limit,
            window: window.into(),
        }
    }

    /// Limit and window length in whole seconds
    ///
    /// Negative limits clamp to zero. A window that does not parse yields
    /// zero seconds.
    pub fn to_seconds(&self) -> (i64, i64) {
        let max_value = self.limit.max(0);
        let seconds = parse_duration(&self.window)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        (max_value, seconds)
    }
}

/// A counter qualifier
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Counter {
    /// CEL expression
    pub expression: String,
}

impl Counter {
    /// Create a counter from a CEL expression
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

/// One mergeable unit of a RateLimitPolicy
#[derive(Clone, Debug, PartialEq)]
pub enum RateLimitRule {
    /// The top-level predicates
    Predicates(Vec<WhenPredicate>),
    /// A named limit
    Limit(Limit),
}

impl HasApiResource for RateLimitPolicy {
    const API_VERSION: &'static str = "kuadrant.io/v1";
    const KIND: &'static str = "RateLimitPolicy";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl MergeablePolicy for RateLimitPolicy {
    type Rule = RateLimitRule;

    fn merge_strategy(&self) -> MergeStrategy {
        self.spec.merge_strategy()
    }

    fn rules(&self) -> Rules<RateLimitRule> {
        let proper = self.spec.proper();
        let mut specs: Vec<(String, RateLimitRule)> = proper
            .limits
            .iter()
            .map(|(name, limit)| {
                (
                    rule_key(LIMITS_GROUP, name),
                    RateLimitRule::Limit(limit.clone()),
                )
            })
            .collect();
        if !proper.when.is_empty() {
            specs.push((
                TOP_LEVEL_PREDICATES_KEY.to_string(),
                RateLimitRule::Predicates(proper.when.clone()),
            ));
        }

        specs
            .into_iter()
            .map(|(key, spec)| {
                let source = self.spec.provenance.get(&key).cloned().unwrap_or_default();
                (key, MergeableRule::new(spec, source))
            })
            .collect()
    }

    fn set_rules(&mut self, rules: Rules<RateLimitRule>) {
        let mut provenance = BTreeMap::new();
        let proper = self.spec.proper_mut();
        *proper = RateLimitPolicyRules::default();

        for (key, rule) in rules {
            match rule.spec {
                RateLimitRule::Predicates(when) => proper.when = when,
                RateLimitRule::Limit(limit) => {
                    proper.limits.insert(rule_id(&key).to_string(), limit);
                }
            }
            if !rule.source.is_empty() {
                provenance.insert(key, rule.source);
            }
        }

        self.spec.provenance = provenance;
    }

    fn is_empty(&self) -> bool {
        self.spec.proper().limits.is_empty()
    }
}

/// Parse a duration string such as "500ms", "2s", "1m" or "1h30m"
///
/// Supported units are `ns`, `us`, `ms`, `s`, `m` and `h`. Every number must
/// carry a unit, except a bare "0".
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = || Error::validation(format!("invalid duration '{}'", s));

    let input = s.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(digits);
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let unit_nanos = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };

        total += Duration::from_nanos((value * unit_nanos) as u64);
        rest = next;
    }

    Ok(total)
}
