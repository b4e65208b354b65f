//! Session authentication configuration.
//!
//! Configuration types for session caching, rotation, and tenancy,
//! organized into logical subsections.

use crate::cookie::CookieConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tessera_core::TenantId;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.session]
/// lifetime = "30d"
/// cache_ttl = "1h"
///
/// [auth.rotation]
/// interval = "15m"
///
/// [auth.tenancy]
/// mode = "multi"
/// demo = false
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session storage and caching configuration.
    pub session: SessionConfig,

    /// Session rotation configuration.
    pub rotation: RotationConfig,

    /// Tenant resolution configuration.
    pub tenancy: TenancyConfig,

    /// Session cookie attributes.
    pub cookie: CookieConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            rotation: RotationConfig::default(),
            tenancy: TenancyConfig::default(),
            cookie: CookieConfig::default(),
        }
    }
}

/// Session lifetime and cache sizing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a session stays valid in the backend. Also drives the
    /// session cookie's Max-Age.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// How long a cached user snapshot may be served before the backend
    /// must be consulted again. Applies to every cache tier.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Maximum number of entries in the hot in-process tier.
    pub hot_capacity: usize,

    /// Maximum number of entries in the warm in-process tier.
    pub warm_capacity: u64,

    /// After a failed backend lookup, further lookups for the same session
    /// id are short-circuited for this long.
    #[serde(with = "humantime_serde")]
    pub lookup_cooldown: Duration,

    /// Interval of the background sweep that drops expired cache entries
    /// and idle rotation records.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            cache_ttl: Duration::from_secs(3600),          // 1 hour
            hot_capacity: 100,
            warm_capacity: 10_000,
            lookup_cooldown: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Session rotation configuration.
///
/// Rotation re-issues the session id of an authenticated user on a fixed
/// cadence so long-lived cookies become moving targets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Enable/disable rotation entirely.
    pub enabled: bool,

    /// Minimum time between two rotations of the same session.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Maximum rotations per client IP within `per_ip_window`.
    pub per_ip_limit: u32,

    /// Window for the per-IP rotation limit.
    #[serde(with = "humantime_serde")]
    pub per_ip_window: Duration,

    /// Rotation bookkeeping for a session is discarded after this long
    /// without activity.
    #[serde(with = "humantime_serde")]
    pub record_idle: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(15 * 60), // 15 minutes
            per_ip_limit: 30,
            per_ip_window: Duration::from_secs(60),
            record_idle: Duration::from_secs(30 * 60), // 2x interval
        }
    }
}

/// How tenants are resolved from the request host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TenancyMode {
    /// One site per deployment; no tenant scoping at all.
    Single,
    /// Tenants resolved from the first subdomain label.
    Multi,
}

impl fmt::Display for TenancyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
        }
    }
}

/// Tenant resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenancyConfig {
    /// Tenancy mode.
    pub mode: TenancyMode,

    /// Demo mode: visitors without a tenant cookie get a generated
    /// throwaway tenant instead of subdomain resolution.
    pub demo: bool,

    /// Tenant assigned to localhost and private-network hosts.
    pub default_tenant: String,

    /// Subdomain labels that never resolve to a tenant.
    pub reserved_subdomains: Vec<String>,

    /// Name of the demo tenant cookie.
    pub tenant_cookie_name: String,

    /// Lifetime of the demo tenant cookie.
    #[serde(with = "humantime_serde")]
    pub tenant_cookie_ttl: Duration,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            mode: TenancyMode::Single,
            demo: false,
            default_tenant: tessera_core::DEFAULT_TENANT.to_string(),
            reserved_subdomains: vec![
                "www".to_string(),
                "app".to_string(),
                "api".to_string(),
                "cdn".to_string(),
                "static".to_string(),
            ],
            tenant_cookie_name: "tessera_tenant".to_string(),
            tenant_cookie_ttl: Duration::from_secs(20 * 60), // 20 minutes
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - Any lifetime, TTL, or interval is zero
    /// - Cache capacities are zero or the warm tier is smaller than the hot tier
    /// - The default tenant or a reserved subdomain is not a valid tenant label
    /// - The cookie configuration is malformed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session.lifetime must be > 0".to_string(),
            ));
        }
        if self.session.cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session.cache_ttl must be > 0".to_string(),
            ));
        }
        if self.session.cache_ttl > self.session.lifetime {
            return Err(ConfigError::InvalidValue(
                "session.cache_ttl cannot exceed session.lifetime".to_string(),
            ));
        }
        if self.session.hot_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "session.hot_capacity must be > 0".to_string(),
            ));
        }
        if self.session.warm_capacity < self.session.hot_capacity as u64 {
            return Err(ConfigError::InvalidValue(
                "session.warm_capacity must be >= session.hot_capacity".to_string(),
            ));
        }
        if self.session.lookup_cooldown.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session.lookup_cooldown must be > 0".to_string(),
            ));
        }
        if self.session.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session.sweep_interval must be > 0".to_string(),
            ));
        }

        if self.rotation.enabled {
            if self.rotation.interval.is_zero() {
                return Err(ConfigError::InvalidValue(
                    "rotation.interval must be > 0".to_string(),
                ));
            }
            if self.rotation.per_ip_limit == 0 {
                return Err(ConfigError::InvalidValue(
                    "rotation.per_ip_limit must be > 0".to_string(),
                ));
            }
            if self.rotation.per_ip_window.is_zero() {
                return Err(ConfigError::InvalidValue(
                    "rotation.per_ip_window must be > 0".to_string(),
                ));
            }
        }

        TenantId::new(&self.tenancy.default_tenant).map_err(|e| {
            ConfigError::InvalidValue(format!("tenancy.default_tenant: {e}"))
        })?;
        for label in &self.tenancy.reserved_subdomains {
            TenantId::new(label).map_err(|e| {
                ConfigError::InvalidValue(format!("tenancy.reserved_subdomains: {e}"))
            })?;
        }
        if self.tenancy.tenant_cookie_name.is_empty() {
            return Err(ConfigError::Missing(
                "tenancy.tenant_cookie_name".to_string(),
            ));
        }
        if self.tenancy.tenant_cookie_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "tenancy.tenant_cookie_ttl must be > 0".to_string(),
            ));
        }

        self.cookie
            .validate()
            .map_err(ConfigError::InvalidValue)?;

        Ok(())
    }
}
