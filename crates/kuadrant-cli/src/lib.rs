//! Kuadrant CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand, ValueEnum};

use kuadrant_common::telemetry::LogFormat;

/// Kuadrant - policy compiler for Gateway API
#[derive(Parser, Debug)]
#[command(name = "kuadrant")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log line format
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = LogFormatArg::Text,
        env = "KUADRANT_LOG_FORMAT"
    )]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile resources into per-gateway wasm configurations
    Compile(commands::compile::CompileArgs),
    /// Validate a CEL expression against a policy kind's environment
    Validate(commands::validate::ValidateArgs),
}

/// Log format flag values
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable text
    Text,
    /// JSON lines
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Compile(args) => commands::compile::run(args),
            Commands::Validate(args) => commands::validate::run(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile_flags() {
        let cli = Cli::try_parse_from([
            "kuadrant",
            "--log-format",
            "json",
            "compile",
            "resources.yaml",
            "--format",
            "yaml",
            "--strict",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormatArg::Json);
        let Commands::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        assert!(args.strict);
        assert_eq!(args.format, commands::compile::OutputFormat::Yaml);
    }

    #[test]
    fn test_parse_validate() {
        let argv = ["kuadrant", "validate", "ratelimit", "auth.identity.user"];
        let cli = Cli::try_parse_from(argv).unwrap();
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.expression, "auth.identity.user");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(Cli::try_parse_from(["kuadrant", "validate", "dnspolicy", "true"]).is_err());
    }
}
