//! Loading resources from multi-document YAML

use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, warn};

use kuadrant_common::gateway_api::{Gateway, GatewayClass, HttpRoute};
use kuadrant_common::HasApiResource;
use kuadrant_policy::crd::Kuadrant;
use kuadrant_policy::{AuthPolicy, KuadrantPolicy, RateLimitPolicy, Topology};

use crate::{Error, Result};

/// Every resource found in a YAML stream
#[derive(Debug, Default)]
pub struct Resources {
    pub classes: Vec<GatewayClass>,
    pub gateways: Vec<Gateway>,
    pub routes: Vec<HttpRoute>,
    pub policies: Vec<KuadrantPolicy>,
    pub kuadrant: Option<Kuadrant>,
}

impl Resources {
    /// Parse a `---` separated stream of resources
    ///
    /// Empty documents are skipped, as are kinds the compiler does not use.
    pub fn parse(yaml: &str) -> Result<Self> {
        let mut resources = Resources::default();

        for (index, document) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
            let value = Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            let kind = value
                .get("kind")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid_resource(index, "missing kind"))?
                .to_string();

            let invalid = |e: serde_yaml::Error| Error::invalid_resource(index, e.to_string());
            match kind.as_str() {
                k if k == GatewayClass::KIND => resources
                    .classes
                    .push(serde_yaml::from_value(value).map_err(invalid)?),
                k if k == Gateway::KIND => resources
                    .gateways
                    .push(serde_yaml::from_value(value).map_err(invalid)?),
                k if k == HttpRoute::KIND => resources
                    .routes
                    .push(serde_yaml::from_value(value).map_err(invalid)?),
                k if k == AuthPolicy::KIND => resources.policies.push(
                    serde_yaml::from_value::<AuthPolicy>(value)
                        .map_err(invalid)?
                        .into(),
                ),
                k if k == RateLimitPolicy::KIND => resources.policies.push(
                    serde_yaml::from_value::<RateLimitPolicy>(value)
                        .map_err(invalid)?
                        .into(),
                ),
                k if k == Kuadrant::KIND => {
                    let kuadrant: Kuadrant = serde_yaml::from_value(value).map_err(invalid)?;
                    if resources.kuadrant.is_some() {
                        warn!(name = %kuadrant.name(), "ignoring additional Kuadrant object");
                    } else {
                        resources.kuadrant = Some(kuadrant);
                    }
                }
                other => debug!(kind = %other, index, "skipping unsupported kind"),
            }
        }

        Ok(resources)
    }

    /// Link the resources into a topology
    pub fn into_topology(self) -> (Topology, Option<Kuadrant>) {
        let topology = Topology::build(self.classes, self.gateways, self.routes, self.policies);
        (topology, self.kuadrant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: GatewayClass
metadata:
  name: istio
spec:
  controllerName: istio.io/gateway-controller
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: unrelated
---
---
apiVersion: kuadrant.io/v1
kind: RateLimitPolicy
metadata:
  name: gw-rl
  namespace: gateway-system
spec:
  targetRef:
    group: gateway.networking.k8s.io
    kind: Gateway
    name: prod-web
  limits:
    global:
      rates:
        - limit: 5
          window: 10s
---
apiVersion: kuadrant.io/v1beta1
kind: Kuadrant
metadata:
  name: kuadrant
  namespace: kuadrant-system
spec:
  observability:
    dataPlane:
      defaultLevels:
        - debug: "true"
"#;

    #[test]
    fn story_parse_mixed_stream() {
        let resources = Resources::parse(STREAM).unwrap();
        assert_eq!(resources.classes.len(), 1);
        assert!(resources.gateways.is_empty());
        assert_eq!(resources.policies.len(), 1);
        assert_eq!(
            resources.policies[0].locator().to_string(),
            "ratelimitpolicy.kuadrant.io:gateway-system/gw-rl"
        );
        assert!(resources.kuadrant.is_some());
    }

    #[test]
    fn test_missing_kind_is_reported_with_index() {
        let err = Resources::parse("metadata:\n  name: x\n").unwrap_err();
        assert!(matches!(err, Error::InvalidResource { index: 0, .. }));
    }

    #[test]
    fn test_malformed_resource_is_reported() {
        let yaml = "kind: Gateway\nmetadata:\n  name: gw\nspec:\n  listeners: 3\n";
        let err = Resources::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("document 0"));
    }
}
