//! Hostname subset checks
//!
//! Gateway API hostnames may carry a single leading wildcard label
//! (`*.example.com`). A listener without a hostname accepts everything and
//! is represented by the bare wildcard `*`.

/// Hostname used when a listener does not restrict hostnames
pub const WILDCARD_HOSTNAME: &str = "*";

/// Whether `name` is covered by `superset`
///
/// - `*` covers every hostname
/// - an exact name covers only itself
/// - `*.example.com` covers `api.example.com`, `a.b.example.com` and
///   `*.api.example.com`, but not `example.com`
pub fn is_subset_of(name: &str, superset: &str) -> bool {
    if superset == WILDCARD_HOSTNAME || name == superset {
        return true;
    }
    match superset.strip_prefix('*') {
        // the wildcard must stand for at least one label
        Some(suffix) => name
            .strip_suffix(suffix)
            .is_some_and(|stem| !stem.is_empty()),
        None => false,
    }
}

/// Route hostnames a listener accepts
///
/// Returns the listener hostname (default `*`) when the route declares none,
/// otherwise the route hostnames that are subsets of it, in route order.
pub fn valid_hostnames(
    listener_hostname: Option<&str>,
    route_hostnames: &[String],
) -> Vec<String> {
    let listener_hostname = listener_hostname.unwrap_or(WILDCARD_HOSTNAME);
    if route_hostnames.is_empty() {
        return vec![listener_hostname.to_string()];
    }
    route_hostnames
        .iter()
        .filter(|h| is_subset_of(h, listener_hostname))
        .cloned()
        .collect()
}
