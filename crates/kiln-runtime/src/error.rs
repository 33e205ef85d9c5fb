//! Runtime error types.

use kiln_engine::KilnError;

/// Errors that can occur while reading configuration, loading modules or
/// resolving through a session.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON configuration or module could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration is well-formed but invalid
    #[error("Config error: {0}")]
    Config(String),

    /// Type or instance resolution error
    #[error("{0}")]
    Engine(#[from] KilnError),
}
