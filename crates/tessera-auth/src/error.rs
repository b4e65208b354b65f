//! Authentication and tenancy error types.
//!
//! This module defines all error types that can occur during session
//! authentication, tenant resolution, and session rotation.

use std::fmt;

/// Errors that can occur during session authentication and tenancy operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request lacks valid authentication credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The authenticated user does not have permission to perform the action.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The backend explicitly reported the session as unknown or expired.
    #[error("Session invalid or expired")]
    InvalidSession,

    /// The session belongs to a different tenant than the request resolved to.
    #[error(
        "Tenant isolation violation: session belongs to '{session_tenant}', request resolved to '{request_tenant}'"
    )]
    TenantIsolation {
        /// Tenant the request resolved to.
        request_tenant: String,
        /// Tenant the session's user belongs to.
        session_tenant: String,
    },

    /// The request hostname does not map to any known tenant.
    #[error("No tenant for host: {host}")]
    TenantNotFound {
        /// Hostname that failed to resolve.
        host: String,
    },

    /// The auth backend could not be reached or answered with a transient fault.
    #[error("Auth backend unavailable: {message}")]
    BackendUnavailable {
        /// Description of the backend fault.
        message: String,
    },

    /// Session rotation could not complete.
    #[error("Session rotation failed: {message}")]
    RotationFailed {
        /// Description of why rotation failed.
        message: String,
    },

    /// An error occurred while storing or retrieving session data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `TenantIsolation` error.
    #[must_use]
    pub fn tenant_isolation(
        request_tenant: impl Into<String>,
        session_tenant: impl Into<String>,
    ) -> Self {
        Self::TenantIsolation {
            request_tenant: request_tenant.into(),
            session_tenant: session_tenant.into(),
        }
    }

    /// Creates a new `TenantNotFound` error.
    #[must_use]
    pub fn tenant_not_found(host: impl Into<String>) -> Self {
        Self::TenantNotFound { host: host.into() }
    }

    /// Creates a new `BackendUnavailable` error.
    #[must_use]
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `RotationFailed` error.
    #[must_use]
    pub fn rotation_failed(message: impl Into<String>) -> Self {
        Self::RotationFailed {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error maps to a 4xx response.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. }
                | Self::Forbidden { .. }
                | Self::InvalidSession
                | Self::TenantIsolation { .. }
                | Self::TenantNotFound { .. }
        )
    }

    /// Returns `true` if this error maps to a 5xx response.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. }
                | Self::RotationFailed { .. }
                | Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if retrying the operation may succeed without any
    /// state change, i.e. the failure was infrastructure, not a verdict.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::Storage { .. }
        )
    }

    /// Returns `true` if the browser's session cookie must be cleared when
    /// this error reaches the response.
    #[must_use]
    pub fn clears_session_cookie(&self) -> bool {
        matches!(self, Self::InvalidSession | Self::TenantIsolation { .. })
    }

    /// Returns `true` if this error should be logged as a security event
    /// rather than an operational one.
    #[must_use]
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::TenantIsolation { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::InvalidSession => ErrorCategory::Session,
            Self::TenantIsolation { .. } => ErrorCategory::Tenancy,
            Self::TenantNotFound { .. } => ErrorCategory::Tenancy,
            Self::BackendUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::RotationFailed { .. } => ErrorCategory::Session,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable error code used in response bodies.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::InvalidSession => "invalid_session",
            Self::TenantIsolation { .. } => "tenant_mismatch",
            Self::TenantNotFound { .. } => "unknown_tenant",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::RotationFailed { .. } => "server_error",
            Self::Storage { .. } => "server_error",
            Self::Configuration { .. } => "server_error",
            Self::Internal { .. } => "server_error",
        }
    }
}

/// Categories of authentication/tenancy errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authentication-related errors (identity verification).
    Authentication,
    /// Authorization-related errors (permission checks).
    Authorization,
    /// Session lifecycle errors (validation, rotation).
    Session,
    /// Tenant resolution and isolation errors.
    Tenancy,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Session => write!(f, "session"),
            Self::Tenancy => write!(f, "tenancy"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
