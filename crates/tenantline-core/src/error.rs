use thiserror::Error;

/// Top-level error type for the Tenantline system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for TenantlineError` so that `?` works across
/// crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TenantlineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Dialogue error: {0}")]
    Dialogue(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for TenantlineError {
    fn from(err: toml::de::Error) -> Self {
        TenantlineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TenantlineError {
    fn from(err: toml::ser::Error) -> Self {
        TenantlineError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TenantlineError {
    fn from(err: serde_json::Error) -> Self {
        TenantlineError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Tenantline operations.
pub type Result<T> = std::result::Result<T, TenantlineError>;
