//! End-to-end compilation of a topology into wasm configurations
//!
//! For every request path the compiler merges the attached policies of each
//! kind into an effective policy, turns them into actions (auth first, then
//! rate limits), validates the actions' CEL and spreads them over the path's
//! action sets. Action sets are grouped into one [`Config`] per gateway.
//!
//! A path that fails to resolve is skipped; a rejected expression is
//! reported as an issue. Neither stops the compilation of other paths.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use kuadrant_cel::{CelType, IssueCollection, Validator, ValidatorBuilder};
use kuadrant_common::{HasApiResource, Locator, Result};
use kuadrant_policy::crd::ObservabilitySpec;
use kuadrant_policy::limitador::{limits_for_policy, LimitadorLimit};
use kuadrant_policy::{
    effective_policy_for_path, objects_in_request_path, AuthPolicy, PolicyKind,
    RateLimitPolicy, Topology, TopologyPath,
};

use crate::action_set::build_action_sets_for_path;
use crate::actions::{build_auth_action, build_rate_limit_actions, rate_limit_scope};
use crate::config::{build_config_for_action_set, build_observability_config, ServiceSettings};
use crate::types::{ActionSet, Config, Observability};
use crate::validation::validate_wasm_action;

/// Name under which AuthPolicy results are visible to CEL
pub const AUTH_BINDING: &str = "auth";
/// Name under which RateLimitPolicy results are visible to CEL
pub const RATELIMIT_BINDING: &str = "ratelimit";

/// Everything a compilation needs besides the topology
#[derive(Clone, Debug)]
pub struct CompilationContext {
    /// Backend services
    pub settings: ServiceSettings,
    /// Per-kind CEL environments
    pub validator: Validator,
    /// Data-plane observability
    pub observability: Option<Observability>,
}

impl CompilationContext {
    /// Context for the given services and Kuadrant observability settings
    ///
    /// Auth is evaluated before rate limiting, so rate-limit expressions may
    /// read `auth` but auth expressions may not read `ratelimit`.
    pub fn new(settings: ServiceSettings, observability: Option<&ObservabilitySpec>) -> Self {
        let validator = ValidatorBuilder::root()
            .add_policy_binding_after(None, PolicyKind::Auth, AUTH_BINDING, CelType::Dyn)
            .add_policy_binding_after(
                Some(PolicyKind::Auth),
                PolicyKind::RateLimit,
                RATELIMIT_BINDING,
                CelType::Dyn,
            )
            .build();
        Self {
            settings,
            validator,
            observability: build_observability_config(observability),
        }
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new(ServiceSettings::default(), None)
    }
}

/// A path left out of the output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedPath {
    /// Id of the path
    pub path_id: String,
    /// Why it was skipped
    pub reason: String,
}

/// Result of compiling a topology
#[derive(Clone, Debug, Default)]
pub struct CompilationOutput {
    /// Wasm configuration per gateway locator
    pub configs: BTreeMap<String, Config>,
    /// Limitador limits per rate-limit scope
    pub limits: BTreeMap<String, Vec<LimitadorLimit>>,
    /// Rejected expressions
    pub issues: IssueCollection,
    /// Paths that did not resolve
    pub skipped_paths: Vec<SkippedPath>,
}

/// What one path contributes
struct PathOutput {
    gateway: String,
    scope: String,
    action_sets: Vec<ActionSet>,
    limits: Vec<LimitadorLimit>,
}

/// Compiles topologies with a fixed context
#[derive(Clone, Debug, Default)]
pub struct PathCompiler {
    ctx: CompilationContext,
}

impl PathCompiler {
    /// Create a compiler
    pub fn new(ctx: CompilationContext) -> Self {
        Self { ctx }
    }

    /// The compilation context
    pub fn context(&self) -> &CompilationContext {
        &self.ctx
    }

    /// Compile every path of the topology
    ///
    /// Gateways without any action set get no configuration. Only fatal
    /// errors are returned; everything else ends up in the output.
    pub fn compile(&self, topology: &Topology) -> Result<CompilationOutput> {
        let mut output = CompilationOutput::default();
        let mut action_sets: BTreeMap<String, Vec<ActionSet>> = BTreeMap::new();

        for path in topology.paths() {
            let path_id = path.id();
            match self.compile_path(&path_id, path, &mut output.issues) {
                Ok(compiled) => {
                    if compiled.action_sets.is_empty() {
                        continue;
                    }
                    action_sets
                        .entry(compiled.gateway)
                        .or_default()
                        .extend(compiled.action_sets);
                    let limits = output.limits.entry(compiled.scope).or_default();
                    for limit in compiled.limits {
                        if !limits.contains(&limit) {
                            limits.push(limit);
                        }
                    }
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(path = %path_id, error = %err, "skipping path");
                    output.skipped_paths.push(SkippedPath {
                        path_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        for (gateway, sets) in action_sets {
            let config = build_config_for_action_set(
                sets,
                &self.ctx.settings,
                self.ctx.observability.clone(),
            );
            output.configs.insert(gateway, config);
        }

        info!(
            gateways = output.configs.len(),
            skipped = output.skipped_paths.len(),
            issues = output.issues.len(),
            "compilation finished"
        );
        Ok(output)
    }

    #[instrument(skip(self, path, issues))]
    fn compile_path(
        &self,
        path_id: &str,
        path: &TopologyPath,
        issues: &mut IssueCollection,
    ) -> Result<PathOutput> {
        let objects = objects_in_request_path(path)?;
        let gateway = objects.gateway.locator().to_string();
        let scope = rate_limit_scope(objects.gateway.namespace(), objects.gateway.name());

        let mut actions = Vec::new();
        let mut limits = Vec::new();

        if let Some(auth) = effective_policy_for_path(path, |p: &AuthPolicy| {
            accepted(p.locator(), p.spec.validate())
        }) {
            actions.push(build_auth_action(path_id, &auth));
        }
        if let Some(rate_limit) = effective_policy_for_path(path, |p: &RateLimitPolicy| {
            accepted(p.locator(), p.spec.validate())
        }) {
            actions.extend(build_rate_limit_actions(&rate_limit, &scope));
            limits = limits_for_policy(&rate_limit, &scope);
        }

        if actions.is_empty() {
            debug!("no policies on path");
            return Ok(PathOutput {
                gateway,
                scope,
                action_sets: Vec::new(),
                limits,
            });
        }

        for action in &actions {
            validate_wasm_action(action, path_id, &self.ctx.validator, issues);
        }

        let action_sets = build_action_sets_for_path(path_id, path, &actions)?;
        Ok(PathOutput {
            gateway,
            scope,
            action_sets,
            limits,
        })
    }
}

/// Whether a policy takes part in merging
fn accepted(locator: Locator, validation: Result<()>) -> bool {
    match validation {
        Ok(()) => true,
        Err(err) => {
            debug!(policy = %locator, error = %err, "ignoring invalid policy");
            false
        }
    }
}
