//! Action sets for a request path
//!
//! A request path yields one action set per (hostname, route match) pair.
//! Every action set of a path shares the same actions; only the route
//! conditions differ. Names are content hashes so that the same input always
//! produces the same configuration.

use sha2::{Digest, Sha256};
use tracing::debug;

use kuadrant_common::gateway_api::HttpRouteMatch;
use kuadrant_common::Result;
use kuadrant_policy::{objects_in_request_path, TopologyPath};

use crate::predicates::predicates_from_http_route_match;
use crate::types::{Action, ActionSet, RouteRuleConditions};

/// Name of an action set: hex sha256 of `<path_id>|<match_index>|<hostname>`
///
/// `match_index` is 1-based.
pub fn action_set_name(path_id: &str, match_index: usize, hostname: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", path_id, match_index, hostname).as_bytes());
    hex::encode(digest)
}

/// Build the action sets of a request path
///
/// Fails with an invalid-path error when the path is not a well-formed
/// GatewayClass→Gateway→Listener→HTTPRoute→HTTPRouteRule walk. A rule
/// without matches behaves as a single match that accepts every request.
pub fn build_action_sets_for_path(
    path_id: &str,
    path: &TopologyPath,
    actions: &[Action],
) -> Result<Vec<ActionSet>> {
    let objects = objects_in_request_path(path)?;

    let unconstrained = [HttpRouteMatch::default()];
    let matches: &[HttpRouteMatch] = if objects.rule.matches.is_empty() {
        &unconstrained
    } else {
        &objects.rule.matches
    };

    let mut action_sets = Vec::with_capacity(objects.hostnames.len() * matches.len());
    for hostname in &objects.hostnames {
        for (index, route_match) in matches.iter().enumerate() {
            action_sets.push(ActionSet {
                name: action_set_name(path_id, index + 1, hostname),
                route_rule_conditions: RouteRuleConditions {
                    hostnames: vec![hostname.clone()],
                    predicates: predicates_from_http_route_match(route_match),
                },
                actions: actions.to_vec(),
            });
        }
    }

    debug!(
        path = %path_id,
        action_sets = action_sets.len(),
        "built action sets"
    );
    Ok(action_sets)
}
