//! Error types for runtime setup

use thiserror::Error;

/// Result type for runtime setup operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised while configuring the sandbox, before any backend loads.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend dependency could not be prepared
    #[error(transparent)]
    Load(#[from] polyrun_core::LoadError),
}
