//! CLI commands

pub mod compile;
pub mod resources;
pub mod validate;
