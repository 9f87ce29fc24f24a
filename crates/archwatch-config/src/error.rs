//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse JSON.
    #[error("failed to parse config: {0}")]
    ParseJson(#[from] serde_json::Error),

    /// Failed to parse TOML.
    #[error("failed to parse TOML config: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// Failed to serialize config as TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A monitor entry failed validation.
    #[error("invalid monitor config #{index}: {reason}")]
    Invalid { index: usize, reason: String },

    /// The config lists no directories.
    #[error("config contains no monitor entries, nothing to watch")]
    Empty,

    /// Refused to overwrite an existing file.
    #[error("config file '{0}' already exists")]
    AlreadyExists(String),
}
