//! CEL validation of compiled actions

use tracing::warn;

use kuadrant_cel::{IssueCollection, Validator};
use kuadrant_policy::PolicyKind;

use crate::actions::{
    AUTH_SERVICE_NAME, RATELIMIT_CHECK_SERVICE_NAME, RATELIMIT_REPORT_SERVICE_NAME,
    RATELIMIT_SERVICE_NAME,
};
use crate::types::{Action, DataType};

/// Policy kind whose environment validates actions sent to `service`
pub fn policy_kind_for_service(service: &str) -> Option<PolicyKind> {
    match service {
        AUTH_SERVICE_NAME => Some(PolicyKind::Auth),
        RATELIMIT_SERVICE_NAME | RATELIMIT_CHECK_SERVICE_NAME | RATELIMIT_REPORT_SERVICE_NAME => {
            Some(PolicyKind::RateLimit)
        }
        _ => None,
    }
}

/// Validate every expression of an action
///
/// Checks the action's predicates, then each data block's predicates and
/// expression values. Every failure is recorded under the owning policy kind
/// and `path_id`; returns whether the action is clean.
pub fn validate_wasm_action(
    action: &Action,
    path_id: &str,
    validator: &Validator,
    issues: &mut IssueCollection,
) -> bool {
    let Some(kind) = policy_kind_for_service(&action.service) else {
        warn!(service = %action.service, path = %path_id, "action targets an unknown service");
        return false;
    };

    let expressions = action
        .predicates
        .iter()
        .chain(action.conditional_data.iter().flat_map(|block| {
            block.predicates.iter().chain(block.data.iter().filter_map(|d| match d {
                DataType::Expression(e) => Some(&e.expression.value),
                DataType::Static(_) => None,
            }))
        }));

    let mut clean = true;
    for expression in expressions {
        if let Err(error) = validator.validate(kind, expression) {
            warn!(
                kind = %kind,
                path = %path_id,
                expression = %expression,
                error = %error,
                "invalid CEL expression"
            );
            issues.add(kind, path_id, expression.clone(), error);
            clean = false;
        }
    }
    clean
}
