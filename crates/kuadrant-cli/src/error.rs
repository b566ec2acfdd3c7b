//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("compilation failed: {0}")]
    Compile(#[from] kuadrant_common::Error),

    #[error("logging setup failed: {0}")]
    Telemetry(#[from] kuadrant_common::telemetry::TelemetryError),

    #[error("invalid resource in document {index}: {message}")]
    InvalidResource { index: usize, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_resource(index: usize, message: impl Into<String>) -> Self {
        Error::InvalidResource {
            index,
            message: message.into(),
        }
    }
}
