//! Data-plane wasm configuration for Kuadrant policies
//!
//! Turns the effective policies of every request path into the action sets
//! the proxy extension evaluates, grouped per gateway.
//!
//! # Modules
//!
//! - [`types`]: the wire model
//! - [`predicates`]: CEL predicates for HTTPRoute matches
//! - [`actions`]: actions for effective AuthPolicies and RateLimitPolicies
//! - [`action_set`]: action sets and their content-addressed names
//! - [`config`]: backend services, env overrides and observability
//! - [`validation`]: CEL validation of actions
//! - [`compiler`]: the end-to-end compiler

#![deny(missing_docs)]

pub mod action_set;
pub mod actions;
pub mod compiler;
pub mod config;
pub mod predicates;
pub mod types;
pub mod validation;

pub use action_set::{action_set_name, build_action_sets_for_path};
pub use compiler::{CompilationContext, CompilationOutput, PathCompiler, SkippedPath};
pub use config::{
    build_config_for_action_set, build_observability_config, OsEnvConfig, ServiceSettings,
    WasmEnvConfig,
};
pub use predicates::predicates_from_http_route_match;
pub use types::{
    Action, ActionSet, ConditionalData, Config, DataType, FailureMode, Observability, Service,
    ServiceType, Tracing,
};
pub use validation::validate_wasm_action;
