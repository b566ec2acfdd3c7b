//! Data-plane actions for effective policies
//!
//! Auth contributes a single action that hands the request to the auth
//! service under the path's auth configuration. Rate limiting contributes
//! one action per limit, each emitting the descriptor entries the matching
//! Limitador limit is conditioned on.

use sha2::{Digest, Sha256};

use kuadrant_policy::crd::{RateLimitRule, WhenPredicate};
use kuadrant_policy::limitador::limit_identifier;
use kuadrant_policy::merge::rule_id;
use kuadrant_policy::{AuthPolicy, MergeablePolicy, RateLimitPolicy};

use crate::types::{Action, ConditionalData, DataType};

/// External auth service
pub const AUTH_SERVICE_NAME: &str = "auth-service";
/// Rate-limit service (check and report)
pub const RATELIMIT_SERVICE_NAME: &str = "ratelimit-service";
/// Rate-limit service, check only
pub const RATELIMIT_CHECK_SERVICE_NAME: &str = "ratelimit-check-service";
/// Rate-limit service, report only
pub const RATELIMIT_REPORT_SERVICE_NAME: &str = "ratelimit-report-service";

/// Value of the descriptor entry that activates a limit
const LIMIT_ACTIVATION_VALUE: &str = "1";

/// Name of the auth configuration for a path: hex sha256 of its id
pub fn auth_config_name(path_id: &str) -> String {
    hex::encode(Sha256::digest(path_id.as_bytes()))
}

/// Rate-limit scope of a gateway: `<namespace>/<name>`
pub fn rate_limit_scope(gateway_namespace: &str, gateway_name: &str) -> String {
    format!("{}/{}", gateway_namespace, gateway_name)
}

/// The auth action of a path governed by `effective`
pub fn build_auth_action(path_id: &str, effective: &AuthPolicy) -> Action {
    Action {
        service: AUTH_SERVICE_NAME.to_string(),
        scope: auth_config_name(path_id),
        predicates: predicates(&effective.spec.proper().when),
        conditional_data: Vec::new(),
    }
}

/// One rate-limit action per limit of `effective`, in rule-key order
///
/// Each action is gated by the policy's top-level predicates followed by the
/// limit's own, and carries one data block: the limit identifier, then one
/// entry per counter.
pub fn build_rate_limit_actions(effective: &RateLimitPolicy, scope: &str) -> Vec<Action> {
    let rules = effective.rules();

    let top_level: Vec<String> = rules
        .values()
        .filter_map(|rule| match &rule.spec {
            RateLimitRule::Predicates(when) => Some(predicates(when)),
            RateLimitRule::Limit(_) => None,
        })
        .flatten()
        .collect();

    rules
        .iter()
        .filter_map(|(key, rule)| match &rule.spec {
            RateLimitRule::Limit(limit) => Some((rule_id(key), &rule.source, limit)),
            RateLimitRule::Predicates(_) => None,
        })
        .map(|(name, source, limit)| {
            let mut data = vec![DataType::static_data(
                limit_identifier(source, name),
                LIMIT_ACTIVATION_VALUE,
            )];
            data.extend(
                limit
                    .counters
                    .iter()
                    .map(|c| DataType::expression(c.expression.clone(), c.expression.clone())),
            );

            Action {
                service: RATELIMIT_SERVICE_NAME.to_string(),
                scope: scope.to_string(),
                predicates: top_level
                    .iter()
                    .cloned()
                    .chain(predicates(&limit.when))
                    .collect(),
                conditional_data: vec![ConditionalData {
                    predicates: Vec::new(),
                    data,
                }],
            }
        })
        .collect()
}

fn predicates(when: &[WhenPredicate]) -> Vec<String> {
    when.iter().map(|w| w.predicate.clone()).collect()
}
