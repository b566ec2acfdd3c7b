//! End-to-end compilation of Gateway API resources and Kuadrant policies
//!
//! Resources are written as YAML, linked into a topology and compiled into
//! per-gateway wasm configurations.

use kuadrant_common::gateway_api::{Gateway, GatewayClass, HttpRoute};
use kuadrant_policy::merge::MergeablePolicy;
use kuadrant_policy::{
    effective_policy_for_path, AuthPolicy, KuadrantPolicy, PolicyKind, RateLimitPolicy, Topology,
};
use kuadrant_wasm::{action_set_name, Config, DataType, PathCompiler};

// =============================================================================
// Fixtures
// =============================================================================

const GATEWAY_CLASS: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: GatewayClass
metadata:
  name: istio
spec:
  controllerName: istio.io/gateway-controller
"#;

const GATEWAY: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: prod-web
  namespace: gateway-system
spec:
  gatewayClassName: istio
  listeners:
    - name: api
      hostname: "*.toystore.com"
      port: 80
      protocol: HTTP
"#;

const ROUTE: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: HTTPRoute
metadata:
  name: toystore
  namespace: toystore
spec:
  parentRefs:
    - name: prod-web
      namespace: gateway-system
  hostnames:
    - api.toystore.com
  rules:
    - name: toys
      matches:
        - method: GET
          path:
            type: PathPrefix
            value: /toys
        - method: POST
          path:
            type: Exact
            value: /toys
    - name: admin
      matches:
        - path:
            value: /admin
          headers:
            - name: X-Admin
              value: "yes"
"#;

const GATEWAY_RLP: &str = r#"
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
  overrides:
    strategy: merge
    limits:
      global:
        rates:
          - limit: 1000
            window: 1m
"#;

const ROUTE_RLP: &str = r#"
apiVersion: kuadrant.io/v1
kind: RateLimitPolicy
metadata:
  name: toystore-rl
  namespace: toystore
spec:
  targetRef:
    group: gateway.networking.k8s.io
    kind: HTTPRoute
    name: toystore
  limits:
    global:
      rates:
        - limit: 5
          window: 10s
    per-user:
      rates:
        - limit: 10
          window: 1m
      counters:
        - expression: auth.identity.username
"#;

const ADMIN_AUTH: &str = r#"
apiVersion: kuadrant.io/v1
kind: AuthPolicy
metadata:
  name: admin-auth
  namespace: toystore
spec:
  targetRef:
    group: gateway.networking.k8s.io
    kind: HTTPRoute
    name: toystore
    sectionName: admin
  when:
    - predicate: "request.method != 'OPTIONS'"
  rules:
    authentication:
      api-key:
        apiKey:
          selector:
            matchLabels:
              app: toystore
"#;

fn topology() -> Topology {
    let class: GatewayClass = serde_yaml::from_str(GATEWAY_CLASS).unwrap();
    let gateway: Gateway = serde_yaml::from_str(GATEWAY).unwrap();
    let route: HttpRoute = serde_yaml::from_str(ROUTE).unwrap();
    let policies: Vec<KuadrantPolicy> = vec![
        serde_yaml::from_str::<RateLimitPolicy>(GATEWAY_RLP).unwrap().into(),
        serde_yaml::from_str::<RateLimitPolicy>(ROUTE_RLP).unwrap().into(),
        serde_yaml::from_str::<AuthPolicy>(ADMIN_AUTH).unwrap().into(),
    ];
    Topology::build(vec![class], vec![gateway], vec![route], policies)
}

const GATEWAY_LOCATOR: &str = "gateway.gateway.networking.k8s.io:gateway-system/prod-web";
const TOYS_PATH: &str = "gateway-system/prod-web#api|toystore/toystore#toys";
const ADMIN_PATH: &str = "gateway-system/prod-web#api|toystore/toystore#admin";

// =============================================================================
// Tests
// =============================================================================

#[test]
fn story_overrides_merge_with_route_limits() {
    let topology = topology();
    let ids: Vec<String> = topology.paths().iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec![TOYS_PATH, ADMIN_PATH]);

    let effective: RateLimitPolicy =
        effective_policy_for_path(&topology.paths()[0], |_| true).unwrap();
    let rules = effective.rules();
    assert_eq!(
        rules.keys().collect::<Vec<_>>(),
        vec!["limits#global", "limits#per-user"]
    );
    // The gateway's overrides win the shared key
    assert_eq!(
        rules["limits#global"].source,
        "ratelimitpolicy.kuadrant.io:gateway-system/gw-rl"
    );
    assert_eq!(
        rules["limits#per-user"].source,
        "ratelimitpolicy.kuadrant.io:toystore/toystore-rl"
    );
}

#[test]
fn story_compile_produces_one_config_per_gateway() {
    let topology = topology();
    let output = PathCompiler::default().compile(&topology).unwrap();

    assert!(output.issues.is_empty(), "unexpected issues: {:?}", output.issues);
    assert!(output.skipped_paths.is_empty());
    assert_eq!(output.configs.len(), 1);

    let config = &output.configs[GATEWAY_LOCATOR];
    // toys: 1 hostname x 2 matches; admin: 1 hostname x 1 match
    assert_eq!(config.action_sets.len(), 3);
    assert_eq!(config.action_sets[0].name, action_set_name(TOYS_PATH, 1, "api.toystore.com"));
    assert_eq!(config.action_sets[1].name, action_set_name(TOYS_PATH, 2, "api.toystore.com"));
    assert_eq!(config.action_sets[2].name, action_set_name(ADMIN_PATH, 1, "api.toystore.com"));

    assert_eq!(
        config.action_sets[1].route_rule_conditions.predicates,
        vec!["request.method == 'POST'", "request.url_path == '/toys'"]
    );

    // Only the admin rule is protected by auth, and auth runs first
    let toys_services: Vec<&str> = config.action_sets[0]
        .actions
        .iter()
        .map(|a| a.service.as_str())
        .collect();
    assert_eq!(toys_services, vec!["ratelimit-service", "ratelimit-service"]);
    let admin = &config.action_sets[2].actions;
    assert_eq!(admin.len(), 3);
    assert_eq!(admin[0].service, "auth-service");
    assert_eq!(admin[0].predicates, vec!["request.method != 'OPTIONS'"]);

    // per-user counter is carried as an expression entry
    let per_user = &config.action_sets[0].actions[1].conditional_data[0].data;
    assert_eq!(
        per_user[1],
        DataType::expression("auth.identity.username", "auth.identity.username")
    );

    let limits = &output.limits["gateway-system/prod-web"];
    let rates: Vec<(i64, i64)> = limits.iter().map(|l| (l.max_value, l.seconds)).collect();
    assert_eq!(rates, vec![(1000, 60), (10, 60)]);
}

#[test]
fn story_compiled_config_round_trips() {
    let output = PathCompiler::default().compile(&topology()).unwrap();
    let config = &output.configs[GATEWAY_LOCATOR];

    let json = config.to_json().unwrap();
    assert_eq!(&Config::from_json(&json).unwrap(), config);
    assert_eq!(&Config::from_struct(config.to_struct().unwrap()).unwrap(), config);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["services"]["auth-service"]["failureMode"], "deny");
    assert_eq!(value["services"]["ratelimit-service"]["timeout"], "100ms");
}

#[test]
fn story_cel_issues_do_not_abort_compilation() {
    let mut auth: AuthPolicy = serde_yaml::from_str(ADMIN_AUTH).unwrap();
    auth.spec.rules.when[0].predicate = "ratelimit.remaining > 0".to_string();

    let class: GatewayClass = serde_yaml::from_str(GATEWAY_CLASS).unwrap();
    let gateway: Gateway = serde_yaml::from_str(GATEWAY).unwrap();
    let route: HttpRoute = serde_yaml::from_str(ROUTE).unwrap();
    let topology = Topology::build(vec![class], vec![gateway], vec![route], vec![auth.into()]);

    let output = PathCompiler::default().compile(&topology).unwrap();
    let issues = output.issues.get(PolicyKind::Auth, ADMIN_PATH);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].expression, "ratelimit.remaining > 0");
    assert_eq!(output.configs[GATEWAY_LOCATOR].action_sets.len(), 1);
}
