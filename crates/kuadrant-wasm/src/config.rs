//! Service settings and configuration assembly
//!
//! Timeouts and failure modes of the backend services can be overridden
//! through environment variables. The settings are read once into a
//! [`ServiceSettings`] snapshot that the compiler carries around.

use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;
use tracing::warn;

use kuadrant_policy::crd::{LogLevel, ObservabilitySpec};

use crate::actions::{
    AUTH_SERVICE_NAME, RATELIMIT_CHECK_SERVICE_NAME, RATELIMIT_REPORT_SERVICE_NAME,
    RATELIMIT_SERVICE_NAME,
};
use crate::types::{ActionSet, Config, FailureMode, Observability, Service, ServiceType, Tracing};

/// Cluster name of the auth service
pub const AUTH_SERVICE_ENDPOINT: &str = "kuadrant-auth-service";
/// Cluster name of the rate-limit service
pub const RATELIMIT_SERVICE_ENDPOINT: &str = "kuadrant-ratelimit-service";
/// Header correlating requests when none is configured
pub const DEFAULT_HTTP_HEADER_IDENTIFIER: &str = "x-request-id";

/// Source of configuration variables
#[cfg_attr(test, automock)]
pub trait WasmEnvConfig: Send + Sync {
    /// Value of a variable, if set
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads variables from the process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEnvConfig;

impl WasmEnvConfig for OsEnvConfig {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Static description of a backend service and its knobs
struct ServiceDefaults {
    name: &'static str,
    type_: ServiceType,
    endpoint: &'static str,
    env_prefix: &'static str,
    timeout: &'static str,
    failure_mode: FailureMode,
}

const SERVICES: [ServiceDefaults; 4] = [
    ServiceDefaults {
        name: AUTH_SERVICE_NAME,
        type_: ServiceType::Auth,
        endpoint: AUTH_SERVICE_ENDPOINT,
        env_prefix: "AUTH_SERVICE",
        timeout: "200ms",
        failure_mode: FailureMode::Deny,
    },
    ServiceDefaults {
        name: RATELIMIT_SERVICE_NAME,
        type_: ServiceType::RateLimit,
        endpoint: RATELIMIT_SERVICE_ENDPOINT,
        env_prefix: "RATELIMIT_SERVICE",
        timeout: "100ms",
        failure_mode: FailureMode::Allow,
    },
    ServiceDefaults {
        name: RATELIMIT_CHECK_SERVICE_NAME,
        type_: ServiceType::RateLimitCheck,
        endpoint: RATELIMIT_SERVICE_ENDPOINT,
        env_prefix: "RATELIMIT_CHECK_SERVICE",
        timeout: "100ms",
        failure_mode: FailureMode::Allow,
    },
    ServiceDefaults {
        name: RATELIMIT_REPORT_SERVICE_NAME,
        type_: ServiceType::RateLimitReport,
        endpoint: RATELIMIT_SERVICE_ENDPOINT,
        env_prefix: "RATELIMIT_REPORT_SERVICE",
        timeout: "100ms",
        failure_mode: FailureMode::Allow,
    },
];

/// Snapshot of the backend services, with overrides applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    services: BTreeMap<String, Service>,
}

impl ServiceSettings {
    /// Read `<PREFIX>_TIMEOUT` and `<PREFIX>_FAILURE_MODE` for every service
    ///
    /// An unrecognised failure mode falls back to the service's default.
    pub fn from_env(env: &dyn WasmEnvConfig) -> Self {
        let services = SERVICES
            .iter()
            .map(|defaults| {
                let timeout = env
                    .var(&format!("{}_TIMEOUT", defaults.env_prefix))
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| defaults.timeout.to_string());

                let failure_mode_key = format!("{}_FAILURE_MODE", defaults.env_prefix);
                let failure_mode = match env.var(&failure_mode_key) {
                    None => defaults.failure_mode,
                    Some(raw) => FailureMode::parse(&raw).unwrap_or_else(|| {
                        warn!(
                            variable = %failure_mode_key,
                            value = %raw,
                            "invalid failure mode, using default"
                        );
                        defaults.failure_mode
                    }),
                };

                (
                    defaults.name.to_string(),
                    Service {
                        endpoint: defaults.endpoint.to_string(),
                        type_: defaults.type_,
                        failure_mode,
                        timeout: Some(timeout),
                    },
                )
            })
            .collect();
        Self { services }
    }

    /// Settings for a service by name
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Every service, by name
    pub fn services(&self) -> &BTreeMap<String, Service> {
        &self.services
    }
}

impl Default for ServiceSettings {
    /// The documented defaults, ignoring the environment
    fn default() -> Self {
        struct NoEnv;
        impl WasmEnvConfig for NoEnv {
            fn var(&self, _key: &str) -> Option<String> {
                None
            }
        }
        Self::from_env(&NoEnv)
    }
}

/// Assemble the configuration of one gateway
pub fn build_config_for_action_set(
    action_sets: Vec<ActionSet>,
    settings: &ServiceSettings,
    observability: Option<Observability>,
) -> Config {
    Config {
        request_data: BTreeMap::new(),
        services: settings.services().clone(),
        action_sets,
        observability,
    }
}

/// Data-plane observability from the Kuadrant observability settings
///
/// Returns `None` without data-plane settings. The default level is the most
/// verbose level present in any entry, whatever its value. The tracing
/// collector endpoint is passed through unchanged as the tracing service;
/// an empty endpoint disables tracing.
pub fn build_observability_config(spec: Option<&ObservabilitySpec>) -> Option<Observability> {
    let spec = spec?;
    let data_plane = spec.data_plane.as_ref()?;

    let default_level = data_plane
        .default_levels
        .iter()
        .filter_map(most_verbose)
        .max()
        .map(|level| level.as_str().to_string());

    let http_header_identifier = data_plane
        .http_header_identifier
        .clone()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_HTTP_HEADER_IDENTIFIER.to_string());

    let tracing = spec
        .tracing
        .as_ref()
        .and_then(|t| t.default_endpoint.clone())
        .filter(|endpoint| !endpoint.is_empty())
        .map(|service| Tracing { service });

    Some(Observability {
        default_level,
        http_header_identifier: Some(http_header_identifier),
        tracing,
    })
}

/// Log levels, least verbose first
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }
}

fn most_verbose(entry: &LogLevel) -> Option<Level> {
    [
        (entry.debug.is_some(), Level::Debug),
        (entry.info.is_some(), Level::Info),
        (entry.warn.is_some(), Level::Warn),
        (entry.error.is_some(), Level::Error),
    ]
    .into_iter()
    .find_map(|(present, level)| present.then_some(level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuadrant_policy::crd::{DataPlaneSpec, TracingSpec};
    use rstest::rstest;

    fn env_with(vars: &'static [(&'static str, &'static str)]) -> MockWasmEnvConfig {
        let mut env = MockWasmEnvConfig::new();
        env.expect_var()
            .returning(move |key| {
                vars.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            });
        env
    }

    #[test]
    fn story_defaults_without_overrides() {
        let settings = ServiceSettings::from_env(&env_with(&[]));

        let auth = settings.service(AUTH_SERVICE_NAME).unwrap();
        assert_eq!(auth.endpoint, AUTH_SERVICE_ENDPOINT);
        assert_eq!(auth.type_, ServiceType::Auth);
        assert_eq!(auth.failure_mode, FailureMode::Deny);
        assert_eq!(auth.timeout.as_deref(), Some("200ms"));

        for name in [
            RATELIMIT_SERVICE_NAME,
            RATELIMIT_CHECK_SERVICE_NAME,
            RATELIMIT_REPORT_SERVICE_NAME,
        ] {
            let service = settings.service(name).unwrap();
            assert_eq!(service.endpoint, RATELIMIT_SERVICE_ENDPOINT);
            assert_eq!(service.failure_mode, FailureMode::Allow);
            assert_eq!(service.timeout.as_deref(), Some("100ms"));
        }
        assert_eq!(settings, ServiceSettings::default());
    }

    #[test]
    fn story_environment_overrides_apply_per_service() {
        let settings = ServiceSettings::from_env(&env_with(&[
            ("AUTH_SERVICE_FAILURE_MODE", "allow"),
            ("AUTH_SERVICE_TIMEOUT", "1s"),
            ("RATELIMIT_CHECK_SERVICE_FAILURE_MODE", "deny"),
        ]));

        let auth = settings.service(AUTH_SERVICE_NAME).unwrap();
        assert_eq!(auth.failure_mode, FailureMode::Allow);
        assert_eq!(auth.timeout.as_deref(), Some("1s"));

        let check = settings.service(RATELIMIT_CHECK_SERVICE_NAME).unwrap();
        assert_eq!(check.failure_mode, FailureMode::Deny);
        // Untouched siblings keep their defaults
        let report = settings.service(RATELIMIT_REPORT_SERVICE_NAME).unwrap();
        assert_eq!(report.failure_mode, FailureMode::Allow);
    }

    #[test]
    fn test_invalid_failure_mode_falls_back() {
        let settings =
            ServiceSettings::from_env(&env_with(&[("AUTH_SERVICE_FAILURE_MODE", "sometimes")]));
        assert_eq!(
            settings.service(AUTH_SERVICE_NAME).unwrap().failure_mode,
            FailureMode::Deny
        );
    }

    #[test]
    fn test_each_knob_read_once() {
        let mut env = MockWasmEnvConfig::new();
        env.expect_var()
            .withf(|key| key.ends_with("_TIMEOUT") || key.ends_with("_FAILURE_MODE"))
            .times(8)
            .returning(|_| None);
        ServiceSettings::from_env(&env);
    }

    #[test]
    fn test_config_carries_all_services() {
        let config = build_config_for_action_set(vec![], &ServiceSettings::default(), None);
        let names: Vec<&str> = config.services.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "auth-service",
                "ratelimit-check-service",
                "ratelimit-report-service",
                "ratelimit-service",
            ]
        );
        assert!(config.action_sets.is_empty());
        assert!(config.observability.is_none());
    }

    fn levels(entries: Vec<LogLevel>) -> ObservabilitySpec {
        ObservabilitySpec {
            data_plane: Some(DataPlaneSpec {
                default_levels: entries,
                http_header_identifier: None,
            }),
            tracing: None,
        }
    }

    fn info() -> LogLevel {
        LogLevel {
            info: Some("true".to_string()),
            ..Default::default()
        }
    }

    fn debug() -> LogLevel {
        LogLevel {
            debug: Some("true".to_string()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::info_then_debug(vec![info(), debug()], Some("DEBUG"))]
    #[case::debug_then_info(vec![debug(), info()], Some("DEBUG"))]
    #[case::error_false_is_present(
        vec![LogLevel { error: Some("false".to_string()), ..Default::default() }],
        Some("ERROR")
    )]
    #[case::warn_over_error(
        vec![
            LogLevel { error: Some("true".to_string()), ..Default::default() },
            LogLevel { warn: Some("true".to_string()), ..Default::default() },
        ],
        Some("WARN")
    )]
    #[case::nothing_present(vec![LogLevel::default()], None)]
    fn test_default_level_priority(#[case] entries: Vec<LogLevel>, #[case] want: Option<&str>) {
        let observability = build_observability_config(Some(&levels(entries))).unwrap();
        assert_eq!(observability.default_level.as_deref(), want);
    }

    #[test]
    fn test_observability_absent_without_data_plane() {
        assert!(build_observability_config(None).is_none());
        let spec = ObservabilitySpec {
            data_plane: None,
            tracing: Some(TracingSpec {
                default_endpoint: Some("rpc://collector:4317".to_string()),
            }),
        };
        assert!(build_observability_config(Some(&spec)).is_none());
    }

    #[test]
    fn test_header_identifier_and_tracing() {
        let mut spec = levels(vec![info()]);
        let observability = build_observability_config(Some(&spec)).unwrap();
        assert_eq!(
            observability.http_header_identifier.as_deref(),
            Some(DEFAULT_HTTP_HEADER_IDENTIFIER)
        );
        assert!(observability.tracing.is_none());

        if let Some(data_plane) = spec.data_plane.as_mut() {
            data_plane.http_header_identifier = Some("x-trace".to_string());
        }
        spec.tracing = Some(TracingSpec {
            default_endpoint: Some("rpc://collector:4317".to_string()),
        });
        let observability = build_observability_config(Some(&spec)).unwrap();
        assert_eq!(observability.http_header_identifier.as_deref(), Some("x-trace"));
        assert_eq!(observability.tracing.unwrap().service, "rpc://collector:4317");
    }

    #[test]
    fn test_tracing_endpoint_is_not_a_registered_service() {
        let mut spec = levels(vec![info()]);
        spec.tracing = Some(TracingSpec {
            default_endpoint: Some("rpc://collector:4317".to_string()),
        });
        let observability = build_observability_config(Some(&spec));
        let config =
            build_config_for_action_set(vec![], &ServiceSettings::default(), observability);
        assert!(!config.services.contains_key("rpc://collector:4317"));
        assert_eq!(config.services.len(), 4);

        spec.tracing = Some(TracingSpec {
            default_endpoint: Some(String::new()),
        });
        assert!(build_observability_config(Some(&spec)).unwrap().tracing.is_none());
    }
}
