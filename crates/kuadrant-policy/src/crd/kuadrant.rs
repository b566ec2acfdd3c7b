//! Kuadrant Custom Resource Definition
//!
//! The cluster-wide Kuadrant object. The compiler only reads its
//! observability settings, which end up in the data-plane configuration.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use kuadrant_common::HasApiResource;

/// Kuadrant spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kuadrant.io",
    version = "v1beta1",
    kind = "Kuadrant",
    plural = "kuadrants",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct KuadrantSpec {
    /// Observability settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilitySpec>,
}

/// Observability settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilitySpec {
    /// Data-plane logging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_plane: Option<DataPlaneSpec>,

    /// Request tracing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing: Option<TracingSpec>,
}

/// Data-plane logging settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneSpec {
    /// Candidate default levels; the most verbose level present wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_levels: Vec<LogLevel>,

    /// Header used to correlate requests in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_header_identifier: Option<String>,
}

/// A log level entry
///
/// A level counts as selected when its field is present, whatever its value.
/// The value is a CEL expression evaluated by the data plane.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LogLevel {
    /// Debug level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
    /// Info level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// Warn level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<String>,
    /// Error level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tracing settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TracingSpec {
    /// Collector endpoint (e.g. "rpc://otel-collector:4317")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_endpoint: Option<String>,
}

impl HasApiResource for Kuadrant {
    const API_VERSION: &'static str = "kuadrant.io/v1beta1";
    const KIND: &'static str = "Kuadrant";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_observability() {
        let yaml = r#"
observability:
  dataPlane:
    defaultLevels:
      - debug: "true"
      - error: "false"
    httpHeaderIdentifier: x-trace
  tracing:
    defaultEndpoint: rpc://otel:4317
"#;
        let spec: KuadrantSpec = serde_yaml::from_str(yaml).unwrap();
        let obs = spec.observability.unwrap();
        let data_plane = obs.data_plane.unwrap();
        assert_eq!(data_plane.default_levels.len(), 2);
        assert_eq!(data_plane.default_levels[1].error.as_deref(), Some("false"));
        assert_eq!(data_plane.http_header_identifier.as_deref(), Some("x-trace"));
        assert_eq!(
            obs.tracing.unwrap().default_endpoint.as_deref(),
            Some("rpc://otel:4317")
        );
    }
}
