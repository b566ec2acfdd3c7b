//! Limitador limit definitions
//!
//! The rate-limit service counts hits per descriptor. Each effective limit
//! becomes one Limitador limit per rate, conditioned on a descriptor entry
//! whose key identifies the limit and the policy that defined it. The
//! data-plane action for the same limit emits that descriptor entry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crd::{RateLimitPolicy, RateLimitRule};
use crate::merge::{rule_id, MergeablePolicy};

/// A limit as understood by Limitador
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitadorLimit {
    /// Counter namespace (the data-plane scope)
    pub namespace: String,
    /// Hits allowed per window
    pub max_value: i64,
    /// Window length
    pub seconds: i64,
    /// Descriptor conditions that select this limit
    pub conditions: Vec<String>,
    /// Descriptor entries that qualify the counters
    pub variables: Vec<String>,
    /// Limit identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Descriptor key identifying a limit
///
/// `limit.<name>__<hash>`, where characters of the name other than ASCII
/// alphanumerics and `_` become `_` and the hash is the first 8 hex
/// characters of sha256 over `<source>/<name>`.
pub fn limit_identifier(source: &str, name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let digest = Sha256::digest(format!("{}/{}", source, name).as_bytes());
    format!("limit.{}__{}", sanitized, &hex::encode(digest)[..8])
}

/// Limitador limits for an effective RateLimitPolicy
///
/// Limits come out in rule-key order, one per rate.
pub fn limits_for_policy(effective: &RateLimitPolicy, namespace: &str) -> Vec<LimitadorLimit> {
    effective
        .rules()
        .into_iter()
        .filter_map(|(key, rule)| match rule.spec {
            RateLimitRule::Limit(limit) => Some((key, rule.source, limit)),
            RateLimitRule::Predicates(_) => None,
        })
        .flat_map(|(key, source, limit)| {
            let identifier = limit_identifier(&source, rule_id(&key));
            let variables: Vec<String> = limit
                .counters
                .iter()
                .map(|c| format!("descriptors[0][\"{}\"]", c.expression))
                .collect();
            limit
                .rates
                .iter()
                .map(|rate| {
                    let (max_value, seconds) = rate.to_seconds();
                    LimitadorLimit {
                        namespace: namespace.to_string(),
                        max_value,
                        seconds,
                        conditions: vec![format!("descriptors[0][\"{}\"] == \"1\"", identifier)],
                        variables: variables.clone(),
                        name: Some(identifier.clone()),
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
