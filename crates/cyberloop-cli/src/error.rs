//! Error types for the cyberloop CLI.

use thiserror::Error;

use cyberloop::{ClientError, CoreError, ToolError};

/// Errors that can occur in the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// I/O error (config file, terminal).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The environment variable holding an API key is unset or empty.
    #[error("API key not found: set the {0} environment variable")]
    MissingApiKey(String),

    /// The completion client could not be built.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// The tool registry could not be built.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// A run failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias using `CliError`.
pub type Result<T> = std::result::Result<T, CliError>;
