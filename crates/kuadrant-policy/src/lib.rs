//! Kuadrant policies: resource definitions, merge strategies and topology
//!
//! Policies attach to Gateway API objects. For every request path through
//! the topology, the policies of one kind found along the path are merged
//! into a single effective policy, with each rule remembering which policy
//! defined it.

#![deny(missing_docs)]

pub mod crd;
pub mod limitador;
pub mod merge;
pub mod topology;

pub use crd::{AuthPolicy, KuadrantPolicy, PolicyKind, RateLimitPolicy};
pub use merge::{MergeStrategy, MergeablePolicy, MergeableRule, Rules};
pub use topology::{
    effective_policy_for_path, objects_in_request_path, policies_in_path, RequestPathObjects,
    Topology, TopologyNode, TopologyObject, TopologyPath,
};
