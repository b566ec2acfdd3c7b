//! Compile command

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tracing::info;

use kuadrant_policy::limitador::LimitadorLimit;
use kuadrant_wasm::{
    CompilationContext, CompilationOutput, Config, OsEnvConfig, PathCompiler, ServiceSettings,
};

use crate::commands::resources::Resources;
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Multi-document YAML with Gateway API resources and Kuadrant policies
    pub file: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Fail when any CEL expression is rejected
    #[arg(long)]
    pub strict: bool,
}

/// Output formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// What the command prints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileReport<'a> {
    /// Wasm configuration per gateway
    pub wasm_configs: &'a BTreeMap<String, Config>,
    /// Limitador limits per scope
    pub limits: &'a BTreeMap<String, Vec<LimitadorLimit>>,
}

pub fn run(args: CompileArgs) -> Result<()> {
    let yaml = std::fs::read_to_string(&args.file)?;
    let output = compile(&yaml, ServiceSettings::from_env(&OsEnvConfig))?;

    for skipped in &output.skipped_paths {
        eprintln!("skipped {}: {}", skipped.path_id, skipped.reason);
    }
    for issue in output.issues.iter() {
        eprintln!("{}", issue);
    }

    println!("{}", render(&output, args.format)?);

    if args.strict && !output.issues.is_empty() {
        return Err(Error::validation(format!(
            "{} invalid expressions",
            output.issues.len()
        )));
    }
    Ok(())
}

/// Compile a YAML stream with the given services
pub fn compile(yaml: &str, settings: ServiceSettings) -> Result<CompilationOutput> {
    let (topology, kuadrant) = Resources::parse(yaml)?.into_topology();
    info!(paths = topology.paths().len(), "topology built");

    let observability = kuadrant
        .as_ref()
        .and_then(|k| k.spec.observability.as_ref());
    let compiler = PathCompiler::new(CompilationContext::new(settings, observability));
    Ok(compiler.compile(&topology)?)
}

/// Render the compiled configs and limits
pub fn render(output: &CompilationOutput, format: OutputFormat) -> Result<String> {
    let report = CompileReport {
        wasm_configs: &output.configs,
        limits: &output.limits,
    };
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Yaml => serde_yaml::to_string(&report)?,
    })
}
