//! Wire model of the data-plane wasm configuration
//!
//! The field names and nesting are read by the proxy extension; they must
//! not change. Lists are order-sensitive: action sets are tried in order and
//! predicates are evaluated in order.
//!
//! ```json
//! {
//!   "services": {
//!     "auth-service": {"endpoint": "kuadrant-auth-service", "type": "auth",
//!                      "failureMode": "deny", "timeout": "200ms"}
//!   },
//!   "actionSets": [{
//!     "name": "<sha256>",
//!     "routeRuleConditions": {"hostnames": ["api.example.com"],
//!                             "predicates": ["request.url_path.startsWith('/')"]},
//!     "actions": [{"service": "auth-service", "scope": "<sha256>"}]
//!   }]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use kuadrant_common::{Error, Result};

const CONFIG_KIND: &str = "wasm config";

/// Complete configuration of the wasm extension for one gateway
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Request attributes exported as well-known metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_data: BTreeMap<String, String>,
    /// Backend services, by name
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    /// Action sets, in evaluation order
    #[serde(default)]
    pub action_sets: Vec<ActionSet>,
    /// Logging and tracing settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<Observability>,
}

impl Config {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::serialization_for_kind(CONFIG_KIND, e.to_string()))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::serialization_for_kind(CONFIG_KIND, e.to_string()))
    }

    /// Convert into a JSON object, as embedded in a WasmPlugin resource
    pub fn to_struct(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::serialization_for_kind(
                CONFIG_KIND,
                format!("expected an object, got {}", other),
            )),
            Err(e) => Err(Error::serialization_for_kind(CONFIG_KIND, e.to_string())),
        }
    }

    /// Convert back from a JSON object
    pub fn from_struct(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::serialization_for_kind(CONFIG_KIND, e.to_string()))
    }
}

/// Kind of backend service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    /// Authorino-compatible external auth
    #[serde(rename = "auth")]
    Auth,
    /// Limitador check-and-report
    #[serde(rename = "ratelimit")]
    RateLimit,
    /// Limitador check only
    #[serde(rename = "ratelimit-check")]
    RateLimitCheck,
    /// Limitador report only
    #[serde(rename = "ratelimit-report")]
    RateLimitReport,
}

/// What the extension does when a service cannot be reached
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Reject the request
    Deny,
    /// Let the request through
    Allow,
}

impl FailureMode {
    /// Parse `deny` or `allow`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deny" => Some(FailureMode::Deny),
            "allow" => Some(FailureMode::Allow),
            _ => None,
        }
    }
}

/// A backend service the extension calls
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Cluster name of the service
    pub endpoint: String,
    /// Service kind
    #[serde(rename = "type")]
    pub type_: ServiceType,
    /// Behaviour on failure
    pub failure_mode: FailureMode,
    /// Call timeout (e.g. "200ms")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Actions applied to requests matching a hostname and route rule match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSet {
    /// Content-addressed name
    pub name: String,
    /// When the action set applies
    pub route_rule_conditions: RouteRuleConditions,
    /// Actions, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

/// Conditions selecting an action set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRuleConditions {
    /// Hostnames the request authority must match
    pub hostnames: Vec<String>,
    /// CEL predicates that must all hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<String>,
}

/// A call to a backend service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Name of the service in [`Config::services`]
    pub service: String,
    /// Opaque scope passed to the service
    pub scope: String,
    /// CEL predicates gating the action
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<String>,
    /// Data blocks; every block whose predicates hold contributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_data: Vec<ConditionalData>,
}

/// Data sent to a service when its predicates hold
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalData {
    /// CEL predicates gating the block
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<String>,
    /// Entries, in order
    pub data: Vec<DataType>,
}

/// A data entry: either a literal or a CEL expression
///
/// Exactly one of `static` or `expression` must be present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataType {
    /// `{"static": {"key", "value"}}`
    Static(StaticData),
    /// `{"expression": {"key", "value"}}`
    Expression(ExpressionData),
}

impl DataType {
    /// Literal entry
    pub fn static_data(key: impl Into<String>, value: impl Into<String>) -> Self {
        DataType::Static(StaticData {
            static_: DataItem::new(key, value),
        })
    }

    /// Expression entry
    pub fn expression(key: impl Into<String>, value: impl Into<String>) -> Self {
        DataType::Expression(ExpressionData {
            expression: DataItem::new(key, value),
        })
    }
}

/// Literal data wrapper
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticData {
    /// The entry
    #[serde(rename = "static")]
    pub static_: DataItem,
}

/// Expression data wrapper
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpressionData {
    /// The entry; `value` is a CEL expression
    pub expression: DataItem,
}

/// Key and value of a data entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    /// Descriptor key
    pub key: String,
    /// Literal value or CEL expression
    pub value: String,
}

impl DataItem {
    /// Create an item
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Logging and tracing settings of the extension
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observability {
    /// Default log level (DEBUG, INFO, WARN or ERROR)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_level: Option<String>,
    /// Header correlating log lines of one request
    #[serde(default)]
    pub http_header_identifier: Option<String>,
    /// Tracing export
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing: Option<Tracing>,
}

/// Tracing export settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracing {
    /// Collector address (e.g. `rpc://otel-collector:4317`)
    ///
    /// The data plane dials this address itself; it is not the name of an
    /// entry in `services`, which only lists auth and rate-limit backends.
    pub service: String,
}
