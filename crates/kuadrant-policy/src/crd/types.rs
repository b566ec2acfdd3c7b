//! Shared types for Kuadrant policy CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the Gateway API object a policy attaches to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// API group of the target (gateway.networking.k8s.io)
    pub group: String,
    /// Kind of the target (Gateway, HTTPRoute)
    pub kind: String,
    /// Name of the target, in the policy's namespace
    pub name: String,
    /// Listener name (Gateway) or rule name (HTTPRoute) to narrow the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl TargetRef {
    /// Target a Gateway
    pub fn gateway(name: impl Into<String>) -> Self {
        Self {
            group: kuadrant_common::gateway_api::GATEWAY_API_GROUP.to_string(),
            kind: "Gateway".to_string(),
            name: name.into(),
            section_name: None,
        }
    }

    /// Target an HTTPRoute
    pub fn http_route(name: impl Into<String>) -> Self {
        Self {
            group: kuadrant_common::gateway_api::GATEWAY_API_GROUP.to_string(),
            kind: "HTTPRoute".to_string(),
            name: name.into(),
            section_name: None,
        }
    }

    /// Narrow the target to a section (listener or route rule)
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section_name = Some(section.into());
        self
    }
}

/// How a defaults/overrides block combines with other policies
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// The whole policy wins or loses as a unit
    #[default]
    Atomic,
    /// Rules are merged one by one by key
    Merge,
}

/// A CEL predicate gating a policy or one of its rules
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct WhenPredicate {
    /// CEL boolean expression
    pub predicate: String,
}

impl WhenPredicate {
    /// Create a predicate from a CEL expression
    pub fn new(predicate: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
        }
    }
}

/// A `defaults` or `overrides` block
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeableSpec<T> {
    /// Merge strategy (atomic unless stated otherwise)
    #[serde(default)]
    pub strategy: Strategy,
    /// The rules of the block
    #[serde(flatten)]
    pub rules: T,
}

/// Implements the three-form accessors for a policy spec.
///
/// The spec type must have `defaults` and `overrides` fields of type
/// `Option<MergeableSpec<$rules>>` and a flattened bare `rules: $rules`.
macro_rules! impl_policy_forms {
    ($spec:ty, $rules:ty) => {
        impl $spec {
            /// The active rule body
            pub fn proper(&self) -> &$rules {
                match (&self.defaults, &self.overrides) {
                    (Some(defaults), _) => &defaults.rules,
                    (None, Some(overrides)) => &overrides.rules,
                    (None, None) => &self.rules,
                }
            }

            /// The active rule body, mutably
            pub fn proper_mut(&mut self) -> &mut $rules {
                match (&mut self.defaults, &mut self.overrides) {
                    (Some(defaults), _) => &mut defaults.rules,
                    (None, Some(overrides)) => &mut overrides.rules,
                    (None, None) => &mut self.rules,
                }
            }

            /// Merge strategy declared by the active form
            pub fn merge_strategy(&self) -> $crate::merge::MergeStrategy {
                use $crate::crd::Strategy;
                use $crate::merge::MergeStrategy;
                match (&self.defaults, &self.overrides) {
                    (Some(d), _) if d.strategy == Strategy::Merge => MergeStrategy::RuleDefaults,
                    (None, Some(o)) if o.strategy == Strategy::Merge => {
                        MergeStrategy::RuleOverrides
                    }
                    (None, Some(_)) => MergeStrategy::AtomicOverrides,
                    _ => MergeStrategy::AtomicDefaults,
                }
            }

            /// Check that exactly one form carries rules
            pub fn validate(&self) -> kuadrant_common::Result<()> {
                if self.defaults.is_some() && self.overrides.is_some() {
                    return Err(kuadrant_common::Error::validation_for_field(
                        "spec",
                        "defaults and overrides are mutually exclusive",
                    ));
                }
                let bare_is_set = self.rules != <$rules>::default();
                if bare_is_set && self.defaults.is_some() {
                    return Err(kuadrant_common::Error::validation_for_field(
                        "spec.defaults",
                        "implicit and explicit defaults are mutually exclusive",
                    ));
                }
                if bare_is_set && self.overrides.is_some() {
                    return Err(kuadrant_common::Error::validation_for_field(
                        "spec.overrides",
                        "overrides and implicit defaults are mutually exclusive",
                    ));
                }
                Ok(())
            }
        }
    };
}

pub(crate) use impl_policy_forms;
