//! Gateway API topology and request paths
//!
//! The topology links GatewayClasses, Gateways (and their listeners) and
//! HTTPRoutes (and their rules) into a DAG, and attaches Kuadrant policies to
//! the objects their `targetRef` points at. Every walk from a GatewayClass to
//! an HTTPRouteRule is a request path: the unit the compiler turns into
//! data-plane configuration.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::crd::{AuthPolicy, KuadrantPolicy, RateLimitPolicy};
use crate::merge::MergeablePolicy;
use kuadrant_common::gateway_api::{
    Gateway, GatewayClass, HttpRoute, HttpRouteRule, Listener, GATEWAY_API_GROUP,
};
use kuadrant_common::hostname::valid_hostnames;
use kuadrant_common::resource::group_kind;
use kuadrant_common::{Error, HasApiResource, Result};

// =============================================================================
// Nodes and paths
// =============================================================================

/// A targetable object in the topology
#[derive(Clone, Debug)]
pub enum TopologyObject {
    /// A GatewayClass
    GatewayClass(Arc<GatewayClass>),
    /// A Gateway
    Gateway(Arc<Gateway>),
    /// One listener of a Gateway
    Listener {
        /// The owning gateway
        gateway: Arc<Gateway>,
        /// The listener
        listener: Listener,
    },
    /// An HTTPRoute
    HttpRoute(Arc<HttpRoute>),
    /// One rule of an HTTPRoute
    HttpRouteRule {
        /// The owning route
        route: Arc<HttpRoute>,
        /// Position of the rule in the route
        index: usize,
    },
}

impl TopologyObject {
    /// Human-readable kind, used as the segment name in path errors
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyObject::GatewayClass(_) => "gatewayclass",
            TopologyObject::Gateway(_) => "gateway",
            TopologyObject::Listener { .. } => "listener",
            TopologyObject::HttpRoute(_) => "httproute",
            TopologyObject::HttpRouteRule { .. } => "httprouterule",
        }
    }

    /// Locator of the object; sections are appended as `#<section>`
    pub fn locator(&self) -> String {
        match self {
            TopologyObject::GatewayClass(class) => class.locator().to_string(),
            TopologyObject::Gateway(gateway) => gateway.locator().to_string(),
            TopologyObject::Listener { gateway, listener } => format!(
                "{}:{}/{}#{}",
                group_kind("Listener", GATEWAY_API_GROUP),
                gateway.namespace(),
                gateway.name(),
                listener.name
            ),
            TopologyObject::HttpRoute(route) => route.locator().to_string(),
            TopologyObject::HttpRouteRule { route, index } => format!(
                "{}:{}/{}#{}",
                group_kind("HTTPRouteRule", GATEWAY_API_GROUP),
                route.namespace(),
                route.name(),
                rule_section_name(route, *index)
            ),
        }
    }

    /// Short `<namespace>/<name>[#<section>]` identifier
    fn short_id(&self) -> String {
        match self {
            TopologyObject::GatewayClass(class) => class.name().to_string(),
            TopologyObject::Gateway(gateway) => {
                format!("{}/{}", gateway.namespace(), gateway.name())
            }
            TopologyObject::Listener { gateway, listener } => {
                format!("{}/{}#{}", gateway.namespace(), gateway.name(), listener.name)
            }
            TopologyObject::HttpRoute(route) => format!("{}/{}", route.namespace(), route.name()),
            TopologyObject::HttpRouteRule { route, index } => format!(
                "{}/{}#{}",
                route.namespace(),
                route.name(),
                rule_section_name(route, *index)
            ),
        }
    }
}

/// Section name of a route rule: its declared name, or `rule-<n>` (1-based)
pub fn rule_section_name(route: &HttpRoute, index: usize) -> String {
    route
        .spec
        .rules
        .get(index)
        .and_then(|rule| rule.name.clone())
        .unwrap_or_else(|| format!("rule-{}", index + 1))
}

/// A topology object and the policies attached to it
#[derive(Clone, Debug)]
pub struct TopologyNode {
    /// The object
    pub object: TopologyObject,
    /// Policies whose target is this object, in attachment order
    pub policies: Vec<KuadrantPolicy>,
}

impl TopologyNode {
    /// Create a node without policies
    pub fn new(object: TopologyObject) -> Self {
        Self {
            object,
            policies: Vec::new(),
        }
    }

    /// Attach a policy
    pub fn with_policy(mut self, policy: impl Into<KuadrantPolicy>) -> Self {
        self.policies.push(policy.into());
        self
    }
}

/// Nodes from least to most specific
#[derive(Clone, Debug, Default)]
pub struct TopologyPath {
    /// The nodes of the path
    pub nodes: Vec<Arc<TopologyNode>>,
}

impl TopologyPath {
    /// Create a path from nodes ordered least to most specific
    pub fn new(nodes: Vec<Arc<TopologyNode>>) -> Self {
        Self { nodes }
    }

    /// Stable identifier: `<gw-ns>/<gw>#<listener>|<route-ns>/<route>#<rule>`
    ///
    /// Paths without sections fall back to joining every node.
    pub fn id(&self) -> String {
        let sections: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| {
                matches!(
                    n.object,
                    TopologyObject::Listener { .. } | TopologyObject::HttpRouteRule { .. }
                )
            })
            .map(|n| n.object.short_id())
            .collect();
        if !sections.is_empty() {
            return sections.join("|");
        }
        self.nodes
            .iter()
            .map(|n| n.object.short_id())
            .collect::<Vec<_>>()
            .join("|")
    }
}

// =============================================================================
// Policies along a path
// =============================================================================

/// A policy kind that can be picked out of a [`KuadrantPolicy`]
pub trait AttachedPolicy: MergeablePolicy {
    /// The wrapped policy, if it is of this kind
    fn select(policy: &KuadrantPolicy) -> Option<&Arc<Self>>;
}

impl AttachedPolicy for AuthPolicy {
    fn select(policy: &KuadrantPolicy) -> Option<&Arc<Self>> {
        match policy {
            KuadrantPolicy::Auth(p) => Some(p),
            _ => None,
        }
    }
}

impl AttachedPolicy for RateLimitPolicy {
    fn select(policy: &KuadrantPolicy) -> Option<&Arc<Self>> {
        match policy {
            KuadrantPolicy::RateLimit(p) => Some(p),
            _ => None,
        }
    }
}

/// Policies of kind `P` along the path, least specific first
///
/// Policies on the same node are ordered by creation timestamp, oldest first;
/// the sort is stable so attachment order breaks remaining ties.
pub fn policies_in_path<P, F>(path: &TopologyPath, predicate: F) -> Vec<Arc<P>>
where
    P: AttachedPolicy,
    F: Fn(&P) -> bool,
{
    path.nodes
        .iter()
        .flat_map(|node| {
            let mut policies: Vec<Arc<P>> = node
                .policies
                .iter()
                .filter_map(P::select)
                .filter(|p| predicate(p))
                .cloned()
                .collect();
            policies.sort_by_key(|p| p.creation_timestamp());
            policies
        })
        .collect()
}

/// Merge every matching policy along the path into one effective policy
///
/// Folds from the most specific policy towards the least specific one; the
/// most specific policy is first merged with itself so that its rules carry
/// provenance. Returns `None` when no policy matches.
pub fn effective_policy_for_path<P, F>(path: &TopologyPath, predicate: F) -> Option<P>
where
    P: AttachedPolicy,
    F: Fn(&P) -> bool,
{
    let policies = policies_in_path(path, predicate);
    let (most_specific, rest) = policies.split_last()?;

    let effective = rest
        .iter()
        .rev()
        .fold(most_specific.merge(most_specific), |effective, less_specific| {
            effective.merge(less_specific)
        });
    Some(effective)
}

// =============================================================================
// Request path resolution
// =============================================================================

/// The objects of a well-formed request path
#[derive(Clone, Debug)]
pub struct RequestPathObjects {
    /// The gateway class
    pub gateway_class: Arc<GatewayClass>,
    /// The gateway
    pub gateway: Arc<Gateway>,
    /// The listener
    pub listener: Listener,
    /// The route
    pub route: Arc<HttpRoute>,
    /// The route rule
    pub rule: HttpRouteRule,
    /// Position of the rule in the route
    pub rule_index: usize,
    /// Route hostnames the listener accepts
    pub hostnames: Vec<String>,
}

/// Resolve a GatewayClass→Gateway→Listener→HTTPRoute→HTTPRouteRule path
///
/// Fails with [`Error::InvalidPath`] naming the first segment that has the
/// wrong type or does not belong to the previous one.
pub fn objects_in_request_path(path: &TopologyPath) -> Result<RequestPathObjects> {
    let [class_node, gateway_node, listener_node, route_node, rule_node] = path.nodes.as_slice()
    else {
        return Err(Error::invalid_path(
            "path",
            format!("expected 5 segments, got {}", path.nodes.len()),
        ));
    };

    let TopologyObject::GatewayClass(gateway_class) = &class_node.object else {
        return Err(unexpected("gatewayclass", &class_node.object));
    };

    let TopologyObject::Gateway(gateway) = &gateway_node.object else {
        return Err(unexpected("gateway", &gateway_node.object));
    };
    if gateway.spec.gateway_class_name != gateway_class.name() {
        return Err(Error::invalid_path(
            "gateway",
            format!(
                "gateway {} is not of class {}",
                gateway.locator(),
                gateway_class.name()
            ),
        ));
    }

    let TopologyObject::Listener {
        gateway: owner,
        listener,
    } = &listener_node.object
    else {
        return Err(unexpected("listener", &listener_node.object));
    };
    if owner.locator() != gateway.locator() || gateway.listener(&listener.name).is_none() {
        return Err(Error::invalid_path(
            "listener",
            format!(
                "listener {} does not belong to gateway {}",
                listener.name,
                gateway.locator()
            ),
        ));
    }

    let TopologyObject::HttpRoute(route) = &route_node.object else {
        return Err(unexpected("httproute", &route_node.object));
    };
    let attached = route.spec.parent_refs.iter().any(|parent| {
        parent.refers_to(gateway, route.namespace())
            && parent
                .section_name
                .as_deref()
                .is_none_or(|section| section == listener.name)
    });
    if !attached {
        return Err(Error::invalid_path(
            "httproute",
            format!(
                "route {} is not attached to listener {}",
                route.locator(),
                listener.name
            ),
        ));
    }
    let hostnames = valid_hostnames(listener.hostname.as_deref(), &route.spec.hostnames);
    if hostnames.is_empty() {
        return Err(Error::invalid_path(
            "httproute",
            format!(
                "no hostname of route {} is a subset of listener {}",
                route.locator(),
                listener.name
            ),
        ));
    }

    let TopologyObject::HttpRouteRule {
        route: rule_owner,
        index,
    } = &rule_node.object
    else {
        return Err(unexpected("httprouterule", &rule_node.object));
    };
    let rule = route
        .spec
        .rules
        .get(*index)
        .filter(|_| rule_owner.locator() == route.locator())
        .ok_or_else(|| {
            Error::invalid_path(
                "httprouterule",
                format!("rule {} does not belong to route {}", index, route.locator()),
            )
        })?;

    Ok(RequestPathObjects {
        gateway_class: gateway_class.clone(),
        gateway: gateway.clone(),
        listener: listener.clone(),
        route: route.clone(),
        rule: rule.clone(),
        rule_index: *index,
        hostnames,
    })
}

fn unexpected(segment: &str, object: &TopologyObject) -> Error {
    Error::invalid_path(
        segment,
        format!("expected {}, got {}", segment, object.kind()),
    )
}

// =============================================================================
// Topology construction
// =============================================================================

/// Gateway API objects linked into request paths, with policies attached
#[derive(Clone, Debug, Default)]
pub struct Topology {
    paths: Vec<TopologyPath>,
    gateways: Vec<Arc<Gateway>>,
}

impl Topology {
    /// Link objects and attach policies to their targets
    ///
    /// Gateways whose class is unknown and routes attached to no known
    /// gateway contribute no paths. Policies whose target does not exist are
    /// ignored.
    pub fn build(
        classes: Vec<GatewayClass>,
        gateways: Vec<Gateway>,
        routes: Vec<HttpRoute>,
        policies: Vec<KuadrantPolicy>,
    ) -> Self {
        let mut attached = BTreeSet::new();
        let mut node = |object: TopologyObject| {
            let object_policies: Vec<KuadrantPolicy> = policies
                .iter()
                .filter(|p| targets(p, &object))
                .cloned()
                .collect();
            attached.extend(object_policies.iter().map(|p| p.locator().to_string()));
            Arc::new(TopologyNode {
                object,
                policies: object_policies,
            })
        };

        let class_nodes: Vec<_> = classes
            .into_iter()
            .map(|c| node(TopologyObject::GatewayClass(Arc::new(c))))
            .collect();
        let gateways: Vec<Arc<Gateway>> = gateways.into_iter().map(Arc::new).collect();
        let route_nodes: Vec<_> = routes
            .into_iter()
            .map(Arc::new)
            .map(|route| {
                let rule_nodes: Vec<_> = (0..route.spec.rules.len())
                    .map(|index| {
                        node(TopologyObject::HttpRouteRule {
                            route: route.clone(),
                            index,
                        })
                    })
                    .collect();
                (node(TopologyObject::HttpRoute(route.clone())), route, rule_nodes)
            })
            .collect();

        let mut paths = Vec::new();
        for gateway in &gateways {
            let Some(class_node) = class_nodes.iter().find(|n| {
                matches!(&n.object, TopologyObject::GatewayClass(c)
                    if c.name() == gateway.spec.gateway_class_name)
            }) else {
                debug!(
                    gateway = %gateway.locator(),
                    class = %gateway.spec.gateway_class_name,
                    "gateway class not found, skipping gateway"
                );
                continue;
            };
            let gateway_node = node(TopologyObject::Gateway(gateway.clone()));

            for listener in &gateway.spec.listeners {
                let listener_node = node(TopologyObject::Listener {
                    gateway: gateway.clone(),
                    listener: listener.clone(),
                });

                for (route_node, route, rule_nodes) in &route_nodes {
                    let bound = route.spec.parent_refs.iter().any(|parent| {
                        parent.refers_to(gateway, route.namespace())
                            && parent
                                .section_name
                                .as_deref()
                                .is_none_or(|section| section == listener.name)
                    });
                    if !bound {
                        continue;
                    }
                    for rule_node in rule_nodes {
                        paths.push(TopologyPath::new(vec![
                            class_node.clone(),
                            gateway_node.clone(),
                            listener_node.clone(),
                            route_node.clone(),
                            rule_node.clone(),
                        ]));
                    }
                }
            }
        }

        for policy in &policies {
            if !attached.contains(&policy.locator().to_string()) {
                warn!(
                    policy = %policy.locator(),
                    target = %policy.target_ref().name,
                    "policy target not found"
                );
            }
        }

        Self { paths, gateways }
    }

    /// Every request path, grouped by gateway in input order
    pub fn paths(&self) -> &[TopologyPath] {
        &self.paths
    }

    /// Gateways known to the topology
    pub fn gateways(&self) -> &[Arc<Gateway>] {
        &self.gateways
    }
}

/// Whether the policy's targetRef points at the object
fn targets(policy: &KuadrantPolicy, object: &TopologyObject) -> bool {
    let target = policy.target_ref();
    if target.group != GATEWAY_API_GROUP {
        return false;
    }
    let section = target.section_name.as_deref();
    let same = |kind: &str, namespace: &str, name: &str| {
        target.kind == kind && target.name == name && policy.namespace() == namespace
    };

    match object {
        TopologyObject::GatewayClass(_) => false,
        TopologyObject::Gateway(gw) => {
            section.is_none() && same(Gateway::KIND, gw.namespace(), gw.name())
        }
        TopologyObject::Listener { gateway, listener } => {
            section == Some(listener.name.as_str())
                && same(Gateway::KIND, gateway.namespace(), gateway.name())
        }
        TopologyObject::HttpRoute(route) => {
            section.is_none() && same(HttpRoute::KIND, route.namespace(), route.name())
        }
        TopologyObject::HttpRouteRule { route, index } => {
            section == Some(rule_section_name(route, *index).as_str())
                && same(HttpRoute::KIND, route.namespace(), route.name())
        }
    }
}
