// Error taxonomy for the scanner and the vault store
use thiserror::Error;

/// Errors raised while loading or interpreting scanner configuration.
/// These are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the registry store.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Entity rejected before persistence; lists every missing field.
    #[error("validation failed for {entity}: missing required fields [{}]", missing.join(", "))]
    Validation {
        entity: &'static str,
        missing: Vec<String>,
    },

    /// Illegal workflow/processing status transition.
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// Store unreachable or corrupt at init.
    #[error("database operation failed: {0}")]
    Database(String),

    #[error("failed to serialize entity: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while persisting the registry snapshot. Fatal; the
/// previous registry is left intact.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to back up existing registry: {0}")]
    Backup(std::io::Error),

    #[error("failed to write registry temp file: {0}")]
    TempWrite(std::io::Error),

    #[error("failed to replace registry file: {0}")]
    Replace(std::io::Error),

    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),
}
