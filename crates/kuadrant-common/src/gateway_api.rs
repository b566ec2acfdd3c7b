//! Gateway API types
//!
//! This module provides the subset of the Kubernetes Gateway API consumed by
//! the policy compiler: GatewayClass, Gateway (with listeners) and HTTPRoute
//! (with rules and request matches).
//!
//! All resource types implement `HasApiResource` for consistent API version
//! handling and locator generation.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::resource::HasApiResource;

/// Gateway API group
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

// =============================================================================
// Macro for default serde functions
// =============================================================================

/// Implements default_api_version() and default_kind() for types
/// implementing HasApiResource.
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as HasApiResource>::KIND.to_string()
            }
        }
    };
}

// =============================================================================
// GatewayClass
// =============================================================================

/// Kubernetes Gateway API GatewayClass resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClass {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "GatewayClass::default_api_version")]
    pub api_version: String,
    /// Resource kind (GatewayClass)
    #[serde(default = "GatewayClass::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// GatewayClass specification
    pub spec: GatewayClassSpec,
}

impl HasApiResource for GatewayClass {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "GatewayClass";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl_api_defaults!(GatewayClass);

impl GatewayClass {
    /// Create a new GatewayClass
    pub fn new(metadata: ObjectMeta, spec: GatewayClassSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// GatewayClass spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClassSpec {
    /// Controller that manages gateways of this class
    pub controller_name: String,
}

// =============================================================================
// Gateway
// =============================================================================

/// Kubernetes Gateway API Gateway resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "Gateway::default_api_version")]
    pub api_version: String,
    /// Resource kind (Gateway)
    #[serde(default = "Gateway::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Gateway specification
    pub spec: GatewaySpec,
}

impl HasApiResource for Gateway {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "Gateway";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl_api_defaults!(Gateway);

impl Gateway {
    /// Create a new Gateway
    pub fn new(metadata: ObjectMeta, spec: GatewaySpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }

    /// Look up a listener by section name
    pub fn listener(&self, name: &str) -> Option<&Listener> {
        self.spec.listeners.iter().find(|l| l.name == name)
    }
}

/// Gateway spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// GatewayClass name (e.g., "istio")
    pub gateway_class_name: String,
    /// Listener configurations
    pub listeners: Vec<Listener>,
}

/// Gateway listener configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Listener name (the section name routes and policies refer to)
    pub name: String,
    /// Optional hostname filter; absent means any hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port number
    pub port: u16,
    /// Protocol (HTTP, HTTPS, ...)
    pub protocol: String,
}

// =============================================================================
// HTTPRoute
// =============================================================================

/// Kubernetes Gateway API HTTPRoute resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "HttpRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (HTTPRoute)
    #[serde(default = "HttpRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// HTTPRoute specification
    pub spec: HttpRouteSpec,
}

impl HasApiResource for HttpRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "HTTPRoute";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl_api_defaults!(HttpRoute);

impl HttpRoute {
    /// Create a new HTTPRoute
    pub fn new(metadata: ObjectMeta, spec: HttpRouteSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// HTTPRoute spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Parent gateway references
    #[serde(default)]
    pub parent_refs: Vec<ParentRef>,
    /// Hostnames to match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    #[serde(default)]
    pub rules: Vec<HttpRouteRule>,
}

/// Parent reference for route resources
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    /// API group (gateway.networking.k8s.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resource kind (Gateway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Gateway name
    pub name: String,
    /// Gateway namespace (defaults to the route's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Listener section name to bind to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl ParentRef {
    /// Create a reference to a Gateway, optionally narrowed to one listener
    pub fn gateway(name: &str, namespace: &str, section_name: Option<&str>) -> Self {
        Self {
            group: Some(GATEWAY_API_GROUP.to_string()),
            kind: Some(Gateway::KIND.to_string()),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            section_name: section_name.map(String::from),
        }
    }

    /// Whether this reference points at the given gateway
    ///
    /// `route_namespace` is used when the reference omits a namespace.
    pub fn refers_to(&self, gateway: &Gateway, route_namespace: &str) -> bool {
        let kind_matches = self.kind.as_deref().unwrap_or(Gateway::KIND) == Gateway::KIND;
        let group_matches =
            self.group.as_deref().unwrap_or(GATEWAY_API_GROUP) == GATEWAY_API_GROUP;
        let namespace = self.namespace.as_deref().unwrap_or(route_namespace);
        kind_matches
            && group_matches
            && gateway.name() == self.name
            && gateway.namespace() == namespace
    }
}

/// HTTPRoute rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Optional rule name (section name policies can target)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Request matches; an empty list matches every request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpRouteMatch>,
    /// Backend references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_refs: Vec<BackendRef>,
}

/// HTTP route match
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteMatch {
    /// Path match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathMatch>,
    /// Header matches (all must match)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HttpHeaderMatch>,
    /// Query parameter matches (all must match)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_params: Vec<HttpQueryParamMatch>,
    /// HTTP method match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
}

/// How a path value is compared
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PathMatchType {
    /// Case-sensitive exact match
    Exact,
    /// Prefix match (the Gateway API default)
    #[default]
    PathPrefix,
    /// Regular expression match
    RegularExpression,
}

/// HTTP path match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpPathMatch {
    /// Match type (defaults to PathPrefix)
    #[serde(rename = "type", default)]
    pub type_: PathMatchType,
    /// Path value (defaults to "/")
    #[serde(default = "HttpPathMatch::default_value")]
    pub value: String,
}

impl HttpPathMatch {
    fn default_value() -> String {
        "/".to_string()
    }

    /// Prefix match on the given path
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            type_: PathMatchType::PathPrefix,
            value: value.into(),
        }
    }

    /// Exact match on the given path
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            type_: PathMatchType::Exact,
            value: value.into(),
        }
    }
}

/// How a header or query parameter value is compared
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValueMatchType {
    /// Exact match (the Gateway API default)
    #[default]
    Exact,
    /// Regular expression match
    RegularExpression,
}

/// HTTP header match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeaderMatch {
    /// Match type (Exact or RegularExpression)
    #[serde(rename = "type", default)]
    pub type_: ValueMatchType,
    /// Header name (case-insensitive)
    pub name: String,
    /// Header value
    pub value: String,
}

impl HttpHeaderMatch {
    /// Exact match of a header value
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_: ValueMatchType::Exact,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// HTTP query parameter match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpQueryParamMatch {
    /// Match type (Exact or RegularExpression)
    #[serde(rename = "type", default)]
    pub type_: ValueMatchType,
    /// Query parameter name (case-sensitive)
    pub name: String,
    /// Query parameter value
    pub value: String,
}

impl HttpQueryParamMatch {
    /// Exact match of a query parameter value
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_: ValueMatchType::Exact,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// HTTP method
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// CONNECT
    Connect,
    /// OPTIONS
    Options,
    /// TRACE
    Trace,
    /// PATCH
    Patch,
}

impl HttpMethod {
    /// Wire representation of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

/// Backend reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    /// Resource kind (Service)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Service name
    pub name: String,
    /// Service port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}
