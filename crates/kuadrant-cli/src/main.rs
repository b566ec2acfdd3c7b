//! Kuadrant CLI
//!
//! Compiles Gateway API resources and Kuadrant policies into data-plane
//! configuration.

use clap::Parser;

use kuadrant_cli::{Cli, Result};
use kuadrant_common::telemetry::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format.into())?;
    cli.run()
}
