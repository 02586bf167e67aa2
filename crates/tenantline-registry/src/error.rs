//! Error types for the property registry.

use tenantline_core::error::TenantlineError;

/// Errors from loading or querying the property registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry lock poisoned: {0}")]
    Lock(String),
    #[error("feed error: {0}")]
    Feed(String),
    #[error("invalid property record: {0}")]
    InvalidRecord(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<RegistryError> for TenantlineError {
    fn from(err: RegistryError) -> Self {
        TenantlineError::Registry(err.to_string())
    }
}
