//! Resource identity helpers
//!
//! Every object the compiler handles (Gateway API objects and policies) is
//! identified by a locator of the form `<groupkind>:<namespace>/<name>`, where
//! `<groupkind>` is the lowercased kind followed by the API group, e.g.
//! `authpolicy.kuadrant.io:toystore/toystore-auth`. Cluster-scoped objects
//! use the short form `<groupkind>:<name>`.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::{Error, Result};

/// Trait for types with a static API version and kind
pub trait HasApiResource {
    /// Full API version (e.g., "gateway.networking.k8s.io/v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "HTTPRoute")
    const KIND: &'static str;

    /// Object metadata
    fn metadata(&self) -> &ObjectMeta;

    /// API group derived from the API version (empty for core resources)
    fn group() -> &'static str {
        Self::API_VERSION
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    /// Object name (empty if unset)
    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Object namespace (empty for cluster-scoped objects)
    fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    /// Stable locator for this object
    fn locator(&self) -> Locator {
        Locator::new(
            group_kind(Self::KIND, Self::group()),
            self.metadata().namespace.clone().filter(|ns| !ns.is_empty()),
            self.name(),
        )
    }
}

/// Build the lowercased `<kind>.<group>` string used in locators
pub fn group_kind(kind: &str, group: &str) -> String {
    if group.is_empty() {
        kind.to_lowercase()
    } else {
        format!("{}.{}", kind.to_lowercase(), group)
    }
}

/// Build object metadata with a name and namespace
pub fn meta(name: impl Into<String>, namespace: impl Into<String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(namespace.into()),
        ..Default::default()
    }
}

/// Stable identifier of a policy or topology object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locator {
    /// Lowercased `<kind>.<group>`
    pub group_kind: String,
    /// Namespace, absent for cluster-scoped objects
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl Locator {
    /// Create a new locator
    pub fn new(
        group_kind: impl Into<String>,
        namespace: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group_kind: group_kind.into(),
            namespace,
            name: name.into(),
        }
    }

    /// Parse `<groupKind>:<namespace>/<name>` or `<groupKind>:<name>`
    pub fn parse(s: &str) -> Result<Self> {
        let (group_kind, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::validation(format!("invalid locator '{}': missing ':'", s)))?;
        if group_kind.is_empty() {
            return Err(Error::validation(format!(
                "invalid locator '{}': empty group kind",
                s
            )));
        }

        let (namespace, name) = match rest.split_once('/') {
            Some((ns, name)) => (Some(ns.to_string()), name),
            None => (None, rest),
        };
        if name.is_empty() || name.contains('/') {
            return Err(Error::validation(format!(
                "invalid locator '{}': bad object name",
                s
            )));
        }

        Ok(Self::new(group_kind, namespace, name))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}:{}/{}", self.group_kind, ns, self.name),
            None => write!(f, "{}:{}", self.group_kind, self.name),
        }
    }
}
