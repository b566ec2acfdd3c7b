//! Layered CEL environments and expression validation
//!
//! Every policy kind gets its own environment: the base bindings (request
//! attributes) plus the bindings of every policy kind registered before it,
//! and its own. Kinds are registered in the order the data plane evaluates
//! them, so a rate-limit predicate may read `auth.*` when auth runs first,
//! never the reverse.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use cel_parser::ast::{EntryExpr, Expr, IdedEntryExpr, IdedExpr};
use cel_parser::Parser;
use thiserror::Error;
use tracing::trace;

use kuadrant_policy::PolicyKind;

/// Functions every environment may call
pub const STANDARD_FUNCTIONS: &[&str] = &[
    "size", "has", "contains", "startsWith", "endsWith", "matches", "exists", "all",
    "exists_one", "map", "filter", "max", "min", "string", "int", "uint", "double", "bytes",
    "bool", "duration", "timestamp", "type", "dyn", "upperAscii", "trim", "split", "join",
    "replace", "indexOf", "lastIndexOf", "substring", "charAt", "getFullYear", "getMonth",
    "getDayOfMonth", "getDayOfWeek", "getDayOfYear", "getHours", "getMinutes", "getSeconds",
    "getMilliseconds",
];

/// Data-plane extension functions
pub const EXTENSION_FUNCTIONS: &[&str] = &["queryMap", "lowerAscii"];

/// Errors raised while validating an expression
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CelError {
    /// No environment was built for the policy kind
    #[error("unknown policy kind {kind}")]
    UnknownPolicy {
        /// The requested kind
        kind: PolicyKind,
    },

    /// The expression does not parse
    #[error("malformed expression: {message}")]
    Malformed {
        /// Parser message, verbatim
        message: String,
    },

    /// The expression references a variable or function the environment lacks
    #[error("undeclared reference to '{name}'")]
    UndeclaredReference {
        /// The unknown identifier
        name: String,
    },

    /// A binding is used in a way its type does not support
    #[error("type error: {message}")]
    Type {
        /// Description of the mismatch
        message: String,
    },
}

/// Declared type of a binding
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CelType {
    /// bool
    Bool,
    /// int
    Int,
    /// uint
    Uint,
    /// double
    Double,
    /// string
    String,
    /// bytes
    Bytes,
    /// google.protobuf.Timestamp
    Timestamp,
    /// google.protobuf.Duration
    Duration,
    /// list(T)
    List(Box<CelType>),
    /// map(K, V)
    Map(Box<CelType>, Box<CelType>),
    /// A named message type
    Object(String),
    /// Any type
    Dyn,
}

impl CelType {
    /// `map(string, dyn)`
    pub fn string_map() -> Self {
        CelType::Map(Box::new(CelType::String), Box::new(CelType::Dyn))
    }

    /// Whether `value.field` selection is allowed on this type
    pub fn supports_field_selection(&self) -> bool {
        matches!(self, CelType::Map(..) | CelType::Object(_) | CelType::Dyn)
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CelType::Bool => f.write_str("bool"),
            CelType::Int => f.write_str("int"),
            CelType::Uint => f.write_str("uint"),
            CelType::Double => f.write_str("double"),
            CelType::String => f.write_str("string"),
            CelType::Bytes => f.write_str("bytes"),
            CelType::Timestamp => f.write_str("google.protobuf.Timestamp"),
            CelType::Duration => f.write_str("google.protobuf.Duration"),
            CelType::List(elem) => write!(f, "list({})", elem),
            CelType::Map(key, value) => write!(f, "map({}, {})", key, value),
            CelType::Object(name) => f.write_str(name),
            CelType::Dyn => f.write_str("dyn"),
        }
    }
}

/// A named, typed variable
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Variable name
    pub name: String,
    /// Declared type
    pub ty: CelType,
}

impl Binding {
    /// Create a binding
    pub fn new(name: impl Into<String>, ty: CelType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Clone, Debug)]
struct PolicyBinding {
    kind: PolicyKind,
    binding: Binding,
}

/// Collects bindings and builds one environment per policy kind
#[derive(Clone, Debug, Default)]
pub struct ValidatorBuilder {
    base: Vec<Binding>,
    policies: Vec<PolicyBinding>,
}

impl ValidatorBuilder {
    /// Builder without any bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with the request attributes the data plane exposes
    pub fn root() -> Self {
        Self::new()
            .with_base_binding(
                "request",
                CelType::Object("google.rpc.context.AttributeContext.Request".to_string()),
            )
            .with_base_binding(
                "source",
                CelType::Object("google.rpc.context.AttributeContext.Peer".to_string()),
            )
            .with_base_binding(
                "destination",
                CelType::Object("google.rpc.context.AttributeContext.Peer".to_string()),
            )
            .with_base_binding("connection", CelType::string_map())
            .with_base_binding("metadata", CelType::string_map())
            .with_base_binding("filter_state", CelType::string_map())
    }

    /// Add a binding visible to every policy kind
    pub fn with_base_binding(mut self, name: impl Into<String>, ty: CelType) -> Self {
        self.base.push(Binding::new(name, ty));
        self
    }

    /// Register a policy binding after every binding pushed so far
    pub fn push_policy_binding(
        mut self,
        kind: PolicyKind,
        name: impl Into<String>,
        ty: CelType,
    ) -> Self {
        self.policies.push(PolicyBinding {
            kind,
            binding: Binding::new(name, ty),
        });
        self
    }

    /// Register a policy binding right after the last binding of `after`
    ///
    /// With `after` unset, or not registered yet, the binding goes first.
    pub fn add_policy_binding_after(
        mut self,
        after: Option<PolicyKind>,
        kind: PolicyKind,
        name: impl Into<String>,
        ty: CelType,
    ) -> Self {
        let position = after
            .and_then(|after| self.policies.iter().rposition(|p| p.kind == after))
            .map_or(0, |index| index + 1);
        self.policies.insert(
            position,
            PolicyBinding {
                kind,
                binding: Binding::new(name, ty),
            },
        );
        self
    }

    /// Build the per-kind environments
    ///
    /// A kind sees the base bindings and the policy bindings up to and
    /// including its own last registration.
    pub fn build(&self) -> Validator {
        let mut environments = BTreeMap::new();
        for (index, policy) in self.policies.iter().enumerate() {
            let bindings = self
                .base
                .iter()
                .chain(self.policies[..=index].iter().map(|p| &p.binding))
                .map(|b| (b.name.clone(), b.ty.clone()))
                .collect();
            environments.insert(policy.kind, Environment { bindings });
        }
        Validator { environments }
    }
}

/// Variables visible to one policy kind
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    bindings: BTreeMap<String, CelType>,
}

impl Environment {
    /// Declared type of a variable
    pub fn lookup(&self, name: &str) -> Option<&CelType> {
        self.bindings.get(name)
    }

    /// Names of every variable
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// Validates expressions against per-kind environments
#[derive(Clone, Debug, Default)]
pub struct Validator {
    environments: BTreeMap<PolicyKind, Environment>,
}

impl Validator {
    /// Environment of a policy kind
    pub fn environment(&self, kind: PolicyKind) -> Option<&Environment> {
        self.environments.get(&kind)
    }

    /// Parse `expr` and check it only references what `kind` may see
    pub fn validate(&self, kind: PolicyKind, expr: &str) -> Result<(), CelError> {
        let env = self
            .environments
            .get(&kind)
            .ok_or(CelError::UnknownPolicy { kind })?;

        let ast = parse(expr)?;
        Scope::new(env).check(&ast)?;

        trace!(kind = %kind, expr, "expression validated");
        Ok(())
    }
}

/// Parse an expression; the parser may panic on some malformed input
fn parse(expr: &str) -> Result<IdedExpr, CelError> {
    match panic::catch_unwind(AssertUnwindSafe(|| Parser::default().parse(expr))) {
        Ok(Ok(ast)) => Ok(ast),
        Ok(Err(err)) => Err(CelError::Malformed {
            message: err.to_string(),
        }),
        Err(_) => Err(CelError::Malformed {
            message: format!("failed to parse '{}'", expr),
        }),
    }
}

/// Environment plus the comprehension variables in scope at a node
struct Scope<'a> {
    env: &'a Environment,
    locals: Vec<&'a str>,
}

impl<'a> Scope<'a> {
    fn new(env: &'a Environment) -> Self {
        Self {
            env,
            locals: Vec::new(),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|local| *local == name)
    }

    fn check(&mut self, node: &'a IdedExpr) -> Result<(), CelError> {
        match &node.expr {
            Expr::Unspecified | Expr::Literal(_) => Ok(()),
            Expr::Ident(name) => {
                if is_internal(name) || self.is_local(name) || self.env.lookup(name).is_some() {
                    Ok(())
                } else {
                    Err(CelError::UndeclaredReference { name: name.clone() })
                }
            }
            Expr::Select(select) => {
                self.check(&select.operand)?;
                self.check_field_selection(&select.operand, &select.field)
            }
            Expr::Call(call) => {
                check_function(&call.func_name)?;
                if let Some(target) = &call.target {
                    self.check(target)?;
                }
                call.args.iter().try_for_each(|arg| self.check(arg))
            }
            Expr::Comprehension(comp) => {
                // the range and the initial accumulator are outside the loop
                self.check(&comp.iter_range)?;
                self.check(&comp.accu_init)?;

                let depth = self.locals.len();
                self.locals.push(&comp.iter_var);
                if let Some(second) = &comp.iter_var2 {
                    self.locals.push(second);
                }
                self.locals.push(&comp.accu_var);
                let body = self
                    .check(&comp.loop_cond)
                    .and_then(|_| self.check(&comp.loop_step))
                    .and_then(|_| self.check(&comp.result));
                self.locals.truncate(depth);
                body
            }
            Expr::List(list) => list.elements.iter().try_for_each(|e| self.check(e)),
            Expr::Map(map) => map.entries.iter().try_for_each(|e| self.check_entry(e)),
            Expr::Struct(st) => st.entries.iter().try_for_each(|e| self.check_entry(e)),
        }
    }

    fn check_entry(&mut self, entry: &'a IdedEntryExpr) -> Result<(), CelError> {
        match &entry.expr {
            EntryExpr::StructField(field) => self.check(&field.value),
            EntryExpr::MapEntry(map_entry) => {
                self.check(&map_entry.key)?;
                self.check(&map_entry.value)
            }
        }
    }

    /// `name.field` on a declared binding whose type has no fields
    fn check_field_selection(&self, operand: &IdedExpr, field: &str) -> Result<(), CelError> {
        let Expr::Ident(name) = &operand.expr else {
            return Ok(());
        };
        if self.is_local(name) {
            return Ok(());
        }
        match self.env.lookup(name) {
            Some(ty) if !ty.supports_field_selection() => Err(CelError::Type {
                message: format!(
                    "'{}' of type '{}' does not support field selection ('{}')",
                    name, ty, field
                ),
            }),
            _ => Ok(()),
        }
    }
}

/// Named functions must be standard or data-plane extensions; operators pass
fn check_function(name: &str) -> Result<(), CelError> {
    if !is_identifier(name)
        || STANDARD_FUNCTIONS.contains(&name)
        || EXTENSION_FUNCTIONS.contains(&name)
    {
        return Ok(());
    }
    Err(CelError::UndeclaredReference {
        name: name.to_string(),
    })
}

/// Comprehension accumulators and operator names
fn is_internal(name: &str) -> bool {
    name.starts_with('@') || name.starts_with("__")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
