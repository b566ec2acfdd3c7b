//! CEL validation for Kuadrant policies
//!
//! Builds one environment per policy kind, layered in data-plane evaluation
//! order, and checks that predicates and data expressions only reference
//! what that kind can see at runtime.

#![deny(missing_docs)]

pub mod issues;
pub mod validator;

pub use issues::{Issue, IssueCollection};
pub use validator::{Binding, CelError, CelType, Environment, Validator, ValidatorBuilder};
