use crate::time::{Timestamp, now_utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a single backing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Service has not finished starting up yet
    #[default]
    Initializing,
    /// Service answered its last probe
    Healthy,
    /// Service failed its last probe
    Unhealthy,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Initializing => "initializing",
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{s}")
    }
}

/// Health report for one named service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    pub message: String,
    pub checked_at: Timestamp,
}

impl ServiceHealth {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Healthy,
            message: message.into(),
            checked_at: now_utc(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Unhealthy,
            message: message.into(),
            checked_at: now_utc(),
        }
    }

    pub fn initializing(message: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Initializing,
            message: message.into(),
            checked_at: now_utc(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }

    pub fn is_unhealthy(&self) -> bool {
        self.status == ServiceStatus::Unhealthy
    }
}

/// Lifecycle state of the whole system.
///
/// `Failed` is terminal; it is only left through an explicit reinitialize,
/// never by a health probe recovering on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SystemState {
    /// Process is up but initialization has not been triggered yet
    #[default]
    Idle,
    /// Exactly one initialization attempt is running
    Initializing,
    /// All critical services are healthy
    Ready,
    /// Critical services are healthy but at least one optional service is not
    Degraded,
    /// A critical service failed; requests are refused until reinitialized
    Failed,
}

impl SystemState {
    /// Whether the system serves regular requests in this state.
    pub fn is_operational(&self) -> bool {
        matches!(self, SystemState::Ready | SystemState::Degraded)
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemState::Idle => "idle",
            SystemState::Initializing => "initializing",
            SystemState::Ready => "ready",
            SystemState::Degraded => "degraded",
            SystemState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_health_constructors() {
        let check = ServiceHealth::healthy("connected");
        assert!(check.is_healthy());
        assert!(!check.is_unhealthy());
        assert_eq!(check.message, "connected");

        let check = ServiceHealth::unhealthy("connection refused");
        assert!(check.is_unhealthy());

        let check = ServiceHealth::initializing("connecting");
        assert_eq!(check.status, ServiceStatus::Initializing);
        assert!(!check.is_healthy());
        assert!(!check.is_unhealthy());
    }

    #[test]
    fn test_system_state_operational() {
        assert!(SystemState::Ready.is_operational());
        assert!(SystemState::Degraded.is_operational());
        assert!(!SystemState::Idle.is_operational());
        assert!(!SystemState::Initializing.is_operational());
        assert!(!SystemState::Failed.is_operational());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ServiceStatus::default(), ServiceStatus::Initializing);
        assert_eq!(SystemState::default(), SystemState::Idle);
    }

    #[test]
    fn test_serialization_shape() {
        let check = ServiceHealth::healthy("connected");
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["message"], "connected");
        assert!(json["checkedAt"].is_string());

        assert_eq!(
            serde_json::to_string(&SystemState::Degraded).unwrap(),
            "\"degraded\""
        );
    }
}
