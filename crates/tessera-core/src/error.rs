use thiserror::Error;

/// Core error types shared across the Tessera crates
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid tenant id: {0}")]
    InvalidTenantId(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("UUID error: {0}")]
    UuidError(#[from] uuid::Error),
}

impl CoreError {
    /// Create a new InvalidTenantId error
    pub fn invalid_tenant_id(message: impl Into<String>) -> Self {
        Self::InvalidTenantId(message.into())
    }

    /// Create a new InvalidTimestamp error
    pub fn invalid_timestamp(message: impl Into<String>) -> Self {
        Self::InvalidTimestamp(message.into())
    }

    /// Create a new InvalidRole error
    pub fn invalid_role(message: impl Into<String>) -> Self {
        Self::InvalidRole(message.into())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
