//! Common types for the Kuadrant policy compiler: errors, Gateway API
//! resources, resource locators, hostname logic and logging setup

#![deny(missing_docs)]

pub mod error;
pub mod gateway_api;
pub mod hostname;
pub mod resource;
pub mod telemetry;

pub use error::Error;
pub use resource::{meta, HasApiResource, Locator};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
