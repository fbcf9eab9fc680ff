//! Core error types

use thiserror::Error;

/// Core error type for cabundle
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML configuration
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
