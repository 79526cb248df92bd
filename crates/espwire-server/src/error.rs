//! Error types for the server.

use std::path::PathBuf;

use espwire_protocol::AtError;
use thiserror::Error;

/// Errors that can occur while setting up or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The module rejected or never answered a protocol step.
    #[error("module error: {0}")]
    Protocol(#[from] AtError),

    /// The serial device could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A local I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`ServerConfig`](crate::ServerConfig).
    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A required setting was not provided.
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
