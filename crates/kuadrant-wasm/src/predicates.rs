//! CEL predicates for HTTPRoute matches
//!
//! One route match becomes an ordered list of CEL expressions that must all
//! hold: method, then path, then headers in source order, then query
//! parameters. Only the first match on a query parameter name is kept.

use std::collections::BTreeSet;

use tracing::debug;

use kuadrant_common::gateway_api::{HttpRouteMatch, PathMatchType, ValueMatchType};

/// Predicates equivalent to one HTTPRoute match
pub fn predicates_from_http_route_match(route_match: &HttpRouteMatch) -> Vec<String> {
    let mut predicates = Vec::new();

    if let Some(method) = &route_match.method {
        predicates.push(format!("request.method == '{}'", method.as_str()));
    }

    if let Some(path) = &route_match.path {
        let value = quote(&path.value);
        predicates.push(match path.type_ {
            PathMatchType::Exact => format!("request.url_path == '{}'", value),
            PathMatchType::PathPrefix => format!("request.url_path.startsWith('{}')", value),
            PathMatchType::RegularExpression => format!("request.url_path.matches('{}')", value),
        });
    }

    for header in &route_match.headers {
        let name = quote(&header.name.to_ascii_lowercase());
        let value = quote(&header.value);
        let compare = match header.type_ {
            ValueMatchType::Exact => format!("request.headers[h] == '{}'", value),
            ValueMatchType::RegularExpression => {
                format!("request.headers[h].matches('{}')", value)
            }
        };
        predicates.push(format!(
            "request.headers.exists(h, h.lowerAscii() == '{}' && {})",
            name, compare
        ));
    }

    let mut seen = BTreeSet::new();
    for param in &route_match.query_params {
        if !seen.insert(param.name.as_str()) {
            debug!(param = %param.name, "dropping duplicate query parameter match");
            continue;
        }
        let name = quote(&param.name);
        let value = quote(&param.value);
        let compare = match param.type_ {
            ValueMatchType::Exact => format!("queryMap(request.query)['{}'] == '{}'", name, value),
            ValueMatchType::RegularExpression => {
                format!("queryMap(request.query)['{}'].matches('{}')", name, value)
            }
        };
        predicates.push(format!(
            "'{}' in queryMap(request.query) ? {} : false",
            name, compare
        ));
    }

    predicates
}

/// Escape a value for a single-quoted CEL string literal
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
