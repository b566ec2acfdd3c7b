//! AuthPolicy Custom Resource Definition
//!
//! An AuthPolicy configures authentication and authorization for the traffic
//! flowing through its target. Its rules are named and grouped by phase
//! (authentication, metadata, authorization, response, callbacks) so that
//! policies at different levels of the topology can be merged rule by rule.
//!
//! ```yaml
//! apiVersion: kuadrant.io/v1
//! kind: AuthPolicy
//! metadata:
//!   name: gateway-auth
//!   namespace: gateway-system
//! spec:
//!   targetRef:
//!     group: gateway.networking.k8s.io
//!     kind: Gateway
//!     name: prod-web
//!   defaults:
//!     strategy: merge
//!     rules:
//!       authentication:
//!         api-key:
//!           apiKey:
//!             selector: {}
//! ```

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{impl_policy_forms, MergeableSpec, TargetRef, WhenPredicate};
use crate::merge::{
    rule_id, rule_key, MergeStrategy, MergeablePolicy, MergeableRule, Rules,
    TOP_LEVEL_PREDICATES_KEY,
};
use kuadrant_common::HasApiResource;

const PATTERNS_GROUP: &str = "patterns";
const AUTHENTICATION_GROUP: &str = "rules.authentication";
const METADATA_GROUP: &str = "rules.metadata";
const AUTHORIZATION_GROUP: &str = "rules.authorization";
const UNAUTHENTICATED_GROUP: &str = "rules.response.unauthenticated";
const UNAUTHORIZED_GROUP: &str = "rules.response.unauthorized";
const SUCCESS_HEADERS_GROUP: &str = "rules.response.success.headers";
const SUCCESS_FILTERS_GROUP: &str = "rules.response.success.filters";
const CALLBACKS_GROUP: &str = "rules.callbacks";

/// AuthPolicy spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kuadrant.io",
    version = "v1",
    kind = "AuthPolicy",
    plural = "authpolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicySpec {
    /// Gateway API object the policy attaches to
    pub target_ref: TargetRef,

    /// Rules that apply unless a more specific policy says otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<MergeableSpec<AuthPolicyRules>>,

    /// Rules that win over every more specific policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<MergeableSpec<AuthPolicyRules>>,

    /// Bare rules (implicit atomic defaults)
    #[serde(flatten)]
    pub rules: AuthPolicyRules,

    /// Locator of the policy that defined each rule, keyed by rule key
    #[serde(skip)]
    #[schemars(skip)]
    pub provenance: BTreeMap<String, String>,
}

impl_policy_forms!(AuthPolicySpec, AuthPolicyRules);

/// Rule-bearing fields of an AuthPolicy body
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicyRules {
    /// Named pattern-matching expressions reusable across rules
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub patterns: BTreeMap<String, Vec<PatternExpression>>,

    /// Top-level predicates gating the whole policy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenPredicate>,

    /// The auth scheme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<AuthScheme>,
}

/// A pattern-matching expression (`selector operator value`)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PatternExpression {
    /// Attribute selector
    pub selector: String,
    /// Comparison operator (eq, neq, incl, excl, matches)
    pub operator: String,
    /// Value to compare with
    pub value: String,
}

/// Auth rules grouped by evaluation phase
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthScheme {
    /// Identity verification rules
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authentication: BTreeMap<String, AuthRuleSpec>,
    /// External metadata fetching rules
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, AuthRuleSpec>,
    /// Authorization rules
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authorization: BTreeMap<String, AuthRuleSpec>,
    /// Response customization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSpec>,
    /// Callbacks run after the auth decision
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub callbacks: BTreeMap<String, AuthRuleSpec>,
}

impl AuthScheme {
    fn is_empty(&self) -> bool {
        self.authentication.is_empty()
            && self.metadata.is_empty()
            && self.authorization.is_empty()
            && self.callbacks.is_empty()
            && self.response.as_ref().is_none_or(ResponseSpec::is_empty)
    }
}

/// A named auth rule: optional predicates plus an evaluator-specific payload
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthRuleSpec {
    /// Predicates gating this rule
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenPredicate>,
    /// Evaluator configuration, passed through untouched
    #[serde(flatten)]
    pub config: BTreeMap<String, Value>,
}

/// Custom denial response
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct DenyResponse {
    /// Response fields (code, headers, body, message), passed through untouched
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// Response customization
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSpec {
    /// Response when authentication fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unauthenticated: Option<DenyResponse>,
    /// Response when authorization fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unauthorized: Option<DenyResponse>,
    /// Data added on success
    #[serde(default)]
    pub success: SuccessResponseSpec,
}

impl ResponseSpec {
    fn is_empty(&self) -> bool {
        self.unauthenticated.is_none()
            && self.unauthorized.is_none()
            && self.success.headers.is_empty()
            && self.success.filters.is_empty()
    }
}

/// Data injected into the request on successful auth
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponseSpec {
    /// Headers added to the upstream request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, AuthRuleSpec>,
    /// Dynamic metadata made available to other filters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, AuthRuleSpec>,
}

/// One mergeable unit of an AuthPolicy
#[derive(Clone, Debug, PartialEq)]
pub enum AuthRule {
    /// A named pattern
    Patterns(Vec<PatternExpression>),
    /// The top-level predicates
    Predicates(Vec<WhenPredicate>),
    /// An authentication rule
    Authentication(AuthRuleSpec),
    /// A metadata rule
    Metadata(AuthRuleSpec),
    /// An authorization rule
    Authorization(AuthRuleSpec),
    /// The unauthenticated response
    Unauthenticated(DenyResponse),
    /// The unauthorized response
    Unauthorized(DenyResponse),
    /// A success header
    SuccessHeader(AuthRuleSpec),
    /// A success filter (dynamic metadata)
    SuccessFilter(AuthRuleSpec),
    /// A callback
    Callback(AuthRuleSpec),
}

impl HasApiResource for AuthPolicy {
    const API_VERSION: &'static str = "kuadrant.io/v1";
    const KIND: &'static str = "AuthPolicy";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl MergeablePolicy for AuthPolicy {
    type Rule = AuthRule;

    fn merge_strategy(&self) -> MergeStrategy {
        self.spec.merge_strategy()
    }

    fn rules(&self) -> Rules<AuthRule> {
        let proper = self.spec.proper();
        let mut specs: Vec<(String, AuthRule)> = Vec::new();

        for (name, pattern) in &proper.patterns {
            specs.push((
                rule_key(PATTERNS_GROUP, name),
                AuthRule::Patterns(pattern.clone()),
            ));
        }
        if !proper.when.is_empty() {
            specs.push((
                TOP_LEVEL_PREDICATES_KEY.to_string(),
                AuthRule::Predicates(proper.when.clone()),
            ));
        }

        if let Some(scheme) = &proper.rules {
            let named: [(&str, _, fn(AuthRuleSpec) -> AuthRule); 4] = [
                (AUTHENTICATION_GROUP, &scheme.authentication, AuthRule::Authentication),
                (METADATA_GROUP, &scheme.metadata, AuthRule::Metadata),
                (AUTHORIZATION_GROUP, &scheme.authorization, AuthRule::Authorization),
                (CALLBACKS_GROUP, &scheme.callbacks, AuthRule::Callback),
            ];
            for (group, entries, wrap) in named {
                for (name, spec) in entries {
                    specs.push((rule_key(group, name), wrap(spec.clone())));
                }
            }

            if let Some(response) = &scheme.response {
                if let Some(deny) = &response.unauthenticated {
                    specs.push((
                        rule_key(UNAUTHENTICATED_GROUP, ""),
                        AuthRule::Unauthenticated(deny.clone()),
                    ));
                }
                if let Some(deny) = &response.unauthorized {
                    specs.push((
                        rule_key(UNAUTHORIZED_GROUP, ""),
                        AuthRule::Unauthorized(deny.clone()),
                    ));
                }
                for (name, spec) in &response.success.headers {
                    specs.push((
                        rule_key(SUCCESS_HEADERS_GROUP, name),
                        AuthRule::SuccessHeader(spec.clone()),
                    ));
                }
                for (name, spec) in &response.success.filters {
                    specs.push((
                        rule_key(SUCCESS_FILTERS_GROUP, name),
                        AuthRule::SuccessFilter(spec.clone()),
                    ));
                }
            }
        }

        specs
            .into_iter()
            .map(|(key, spec)| {
                let source = self.spec.provenance.get(&key).cloned().unwrap_or_default();
                (key, MergeableRule::new(spec, source))
            })
            .collect()
    }

    fn set_rules(&mut self, rules: Rules<AuthRule>) {
        let mut provenance = BTreeMap::new();
        let proper = self.spec.proper_mut();
        *proper = AuthPolicyRules::default();

        for (key, rule) in rules {
            let id = rule_id(&key).to_string();
            match rule.spec {
                AuthRule::Patterns(pattern) => {
                    proper.patterns.insert(id, pattern);
                }
                AuthRule::Predicates(when) => proper.when = when,
                AuthRule::Authentication(spec) => {
                    scheme_mut(proper).authentication.insert(id, spec);
                }
                AuthRule::Metadata(spec) => {
                    scheme_mut(proper).metadata.insert(id, spec);
                }
                AuthRule::Authorization(spec) => {
                    scheme_mut(proper).authorization.insert(id, spec);
                }
                AuthRule::Callback(spec) => {
                    scheme_mut(proper).callbacks.insert(id, spec);
                }
                AuthRule::Unauthenticated(deny) => {
                    response_mut(proper).unauthenticated = Some(deny);
                }
                AuthRule::Unauthorized(deny) => {
                    response_mut(proper).unauthorized = Some(deny);
                }
                AuthRule::SuccessHeader(spec) => {
                    response_mut(proper).success.headers.insert(id, spec);
                }
                AuthRule::SuccessFilter(spec) => {
                    response_mut(proper).success.filters.insert(id, spec);
                }
            }
            if !rule.source.is_empty() {
                provenance.insert(key, rule.source);
            }
        }

        self.spec.provenance = provenance;
    }

    fn is_empty(&self) -> bool {
        self.spec
            .proper()
            .rules
            .as_ref()
            .is_none_or(AuthScheme::is_empty)
    }
}

fn scheme_mut(rules: &mut AuthPolicyRules) -> &mut AuthScheme {
    rules.rules.get_or_insert_with(AuthScheme::default)
}

fn response_mut(rules: &mut AuthPolicyRules) -> &mut ResponseSpec {
    scheme_mut(rules)
        .response
        .get_or_insert_with(ResponseSpec::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Strategy;
    use kuadrant_common::meta;
    use serde_json::json;

    fn api_key_rule() -> AuthRuleSpec {
        AuthRuleSpec {
            when: vec![],
            config: BTreeMap::from([("apiKey".to_string(), json!({"selector": {}}))]),
        }
    }

    fn sample_policy() -> AuthPolicy {
        let mut scheme = AuthScheme::default();
        scheme
            .authentication
            .insert("api-key".to_string(), api_key_rule());
        scheme.authorization.insert(
            "admins-only".to_string(),
            AuthRuleSpec {
                when: vec![WhenPredicate::new("request.path.startsWith('/admin')")],
                config: BTreeMap::from([("opa".to_string(), json!({"rego": "allow = true"}))]),
            },
        );
        scheme.response = Some(ResponseSpec {
            unauthenticated: Some(DenyResponse {
                fields: BTreeMap::from([("code".to_string(), json!(401))]),
            }),
            ..Default::default()
        });

        AuthPolicy {
            metadata: meta("toystore-auth", "toystore"),
            spec: AuthPolicySpec {
                target_ref: TargetRef::http_route("toystore"),
                rules: AuthPolicyRules {
                    patterns: BTreeMap::from([(
                        "admin-path".to_string(),
                        vec![PatternExpression {
                            selector: "request.url_path".to_string(),
                            operator: "matches".to_string(),
                            value: "^/admin".to_string(),
                        }],
                    )]),
                    when: vec![WhenPredicate::new("request.method == 'GET'")],
                    rules: Some(scheme),
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn story_rules_are_keyed_by_group_and_name() {
        let rules = sample_policy().rules();
        let keys: Vec<&str> = rules.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "patterns#admin-path",
                "predicates#",
                "rules.authentication#api-key",
                "rules.authorization#admins-only",
                "rules.response.unauthenticated#",
            ]
        );
        assert!(rules.values().all(|r| r.source.is_empty()));
    }

    #[test]
    fn story_set_rules_round_trips_rule_content() {
        let policy = sample_policy();
        let mut copy = policy.clone();
        copy.set_rules(policy.rules());
        assert_eq!(copy.spec.proper(), policy.spec.proper());
        assert_eq!(copy.rules(), policy.rules());
    }

    #[test]
    fn story_set_rules_clears_previous_rules() {
        let mut policy = sample_policy();
        let only_authn: Rules<AuthRule> = policy
            .rules()
            .into_iter()
            .filter(|(k, _)| k.starts_with("rules.authentication#"))
            .collect();

        policy.set_rules(only_authn);

        let proper = policy.spec.proper();
        assert!(proper.patterns.is_empty());
        assert!(proper.when.is_empty());
        let scheme = proper.rules.as_ref().unwrap();
        assert!(scheme.authorization.is_empty());
        assert!(scheme.response.is_none());
        assert_eq!(scheme.authentication.len(), 1);
    }

    #[test]
    fn story_provenance_survives_set_rules() {
        let mut policy = sample_policy();
        let stamped: Rules<AuthRule> = policy
            .rules()
            .into_iter()
            .map(|(k, r)| (k, r.with_default_source("authpolicy.kuadrant.io:gw/parent")))
            .collect();
        policy.set_rules(stamped);

        assert!(policy
            .rules()
            .values()
            .all(|r| r.source == "authpolicy.kuadrant.io:gw/parent"));
    }

    #[test]
    fn test_set_rules_writes_into_active_form() {
        let mut policy = sample_policy();
        let rules = policy.rules();
        policy.spec.defaults = Some(MergeableSpec {
            strategy: Strategy::Merge,
            rules: AuthPolicyRules::default(),
        });
        policy.spec.rules = AuthPolicyRules::default();

        policy.set_rules(rules);

        assert_eq!(policy.spec.rules, AuthPolicyRules::default());
        assert!(policy.spec.defaults.as_ref().unwrap().rules.rules.is_some());
        assert_eq!(policy.merge_strategy(), MergeStrategy::RuleDefaults);
    }

    #[test]
    fn test_empty_ignores_patterns_and_predicates() {
        let mut policy = sample_policy();
        assert!(!policy.is_empty());

        policy.spec.rules.rules = None;
        assert!(policy.is_empty());

        policy.spec.rules.rules = Some(AuthScheme::default());
        assert!(policy.is_empty());
    }

    #[test]
    fn test_locator_format() {
        assert_eq!(
            sample_policy().locator().to_string(),
            "authpolicy.kuadrant.io:toystore/toystore-auth"
        );
    }

    #[test]
    fn test_deserialize_overrides_form() {
        let yaml = r#"
targetRef:
  group: gateway.networking.k8s.io
  kind: Gateway
  name: prod-web
overrides:
  strategy: merge
  rules:
    authorization:
      deny-all:
        opa:
          rego: "allow = false"
"#;
        let spec: AuthPolicySpec = serde_yaml::from_str(yaml).unwrap();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.merge_strategy(), MergeStrategy::RuleOverrides);
        let scheme = spec.proper().rules.as_ref().unwrap();
        assert!(scheme.authorization.contains_key("deny-all"));
        assert_eq!(spec.rules, AuthPolicyRules::default());
    }

    #[test]
    fn test_validate_rejects_mixed_forms() {
        let mut spec = sample_policy().spec;
        spec.defaults = Some(MergeableSpec::default());
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("spec.defaults"));

        spec.rules = AuthPolicyRules::default();
        spec.overrides = Some(MergeableSpec::default());
        assert!(spec.validate().is_err());
    }
}
