//! Validate command

use clap::{Args, ValueEnum};

use kuadrant_policy::PolicyKind;
use kuadrant_wasm::CompilationContext;

use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Policy kind whose environment the expression is checked against
    #[arg(value_enum)]
    pub kind: KindArg,

    /// CEL expression
    pub expression: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Auth,
    #[value(name = "ratelimit")]
    RateLimit,
}

impl From<KindArg> for PolicyKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Auth => PolicyKind::Auth,
            KindArg::RateLimit => PolicyKind::RateLimit,
        }
    }
}

pub fn run(args: ValidateArgs) -> Result<()> {
    check(args.kind, &args.expression)?;
    println!("ok");
    Ok(())
}

/// Check one expression against the environment of `kind`
pub fn check(kind: KindArg, expression: &str) -> Result<()> {
    let ctx = CompilationContext::default();
    ctx.validator
        .validate(kind.into(), expression)
        .map_err(|e| Error::validation(format!("{}: {}", PolicyKind::from(kind), e)))
}
