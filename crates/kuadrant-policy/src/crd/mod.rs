//! Custom Resource Definitions for Kuadrant policies
//!
//! Policies attach to Gateway API objects through a `targetRef` and carry
//! their rules in exactly one of three forms:
//!
//! - a bare body (implicit atomic defaults)
//! - `defaults: { strategy, ... }`
//! - `overrides: { strategy, ... }`
//!
//! The active form is called the *proper* spec. Merging reads and writes rules
//! through the proper spec only.

mod auth_policy;
mod kuadrant;
mod ratelimit_policy;
mod types;

use std::sync::Arc;

pub use auth_policy::{
    AuthPolicy, AuthPolicyRules, AuthPolicySpec, AuthRule, AuthRuleSpec, AuthScheme,
    DenyResponse, PatternExpression, ResponseSpec, SuccessResponseSpec,
};
pub use kuadrant::{
    DataPlaneSpec, Kuadrant, KuadrantSpec, LogLevel, ObservabilitySpec, TracingSpec,
};
pub use ratelimit_policy::{
    Counter, Limit, Rate, RateLimitPolicy, RateLimitPolicyRules, RateLimitPolicySpec,
    RateLimitRule,
};
pub use types::{MergeableSpec, Strategy, TargetRef, WhenPredicate};

use kuadrant_common::{HasApiResource, Locator};

/// Policy kinds the compiler understands
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyKind {
    /// kuadrant.io/v1 AuthPolicy
    Auth,
    /// kuadrant.io/v1 RateLimitPolicy
    RateLimit,
}

impl PolicyKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Auth => AuthPolicy::KIND,
            PolicyKind::RateLimit => RateLimitPolicy::KIND,
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy of any supported kind attached to a topology node
///
/// Policies are shared read-only between every path that crosses their
/// target; merging clones before touching rules.
#[derive(Clone, Debug)]
pub enum KuadrantPolicy {
    /// An AuthPolicy
    Auth(Arc<AuthPolicy>),
    /// A RateLimitPolicy
    RateLimit(Arc<RateLimitPolicy>),
}

impl KuadrantPolicy {
    /// Kind of the wrapped policy
    pub fn kind(&self) -> PolicyKind {
        match self {
            KuadrantPolicy::Auth(_) => PolicyKind::Auth,
            KuadrantPolicy::RateLimit(_) => PolicyKind::RateLimit,
        }
    }

    /// Locator of the wrapped policy
    pub fn locator(&self) -> Locator {
        match self {
            KuadrantPolicy::Auth(p) => p.locator(),
            KuadrantPolicy::RateLimit(p) => p.locator(),
        }
    }

    /// Namespace of the wrapped policy
    pub fn namespace(&self) -> &str {
        match self {
            KuadrantPolicy::Auth(p) => p.namespace(),
            KuadrantPolicy::RateLimit(p) => p.namespace(),
        }
    }

    /// Target reference of the wrapped policy
    pub fn target_ref(&self) -> &TargetRef {
        match self {
            KuadrantPolicy::Auth(p) => &p.spec.target_ref,
            KuadrantPolicy::RateLimit(p) => &p.spec.target_ref,
        }
    }
}

impl From<AuthPolicy> for KuadrantPolicy {
    fn from(policy: AuthPolicy) -> Self {
        KuadrantPolicy::Auth(Arc::new(policy))
    }
}

impl From<RateLimitPolicy> for KuadrantPolicy {
    fn from(policy: RateLimitPolicy) -> Self {
        KuadrantPolicy::RateLimit(Arc::new(policy))
    }
}
