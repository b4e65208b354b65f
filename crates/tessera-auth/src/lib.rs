//! # tessera-auth
//!
//! Request authentication and tenancy module for the Tessera CMS server.
//!
//! This crate provides:
//! - Cookie-based session authentication with a two-tier local cache
//! - Write-through integration with a distributed session cache
//! - Periodic session rotation with per-IP rate limiting
//! - Host-based tenant resolution with strict tenant isolation
//! - Lookup cooldowns so a struggling backend is not hammered
//!
//! ## Overview
//!
//! Every request flows through the [`gate::AuthenticationGate`], which turns
//! the request host, cookies and client IP into an [`gate::AuthContext`].
//! Session validation prefers the in-process cache tiers, falls back to the
//! distributed cache and only then asks the authentication backend. Misses
//! are authoritative; failures are not, and degrade to anonymous service.
//!
//! ## Modules
//!
//! - [`config`] - Session, rotation and tenancy configuration
//! - [`cookie`] - Session cookie building and parsing
//! - [`gate`] - The per-request authentication gate and extractors
//! - [`session`] - Session types, cache tiers, cooldown and rotation
//! - [`storage`] - Backend and distributed cache traits
//! - [`tenant`] - Host and cookie based tenant resolution
//! - [`http`] - Axum handlers for login and logout

pub mod config;
pub mod cookie;
pub mod error;
pub mod gate;
pub mod http;
pub mod session;
pub mod storage;
pub mod tenant;

pub use config::{
    AuthConfig, ConfigError, RotationConfig, SessionConfig, TenancyConfig, TenancyMode,
};
pub use cookie::CookieConfig;
pub use error::{AuthError, ErrorCategory};
pub use gate::{AuthContext, AuthenticationGate, CurrentUser, GateOutcome, MaybeUser};
pub use http::{LoginState, LogoutState, login_handler, logout_handler};
pub use session::cache::{CacheStats, SessionCache};
pub use session::cooldown::LookupCooldown;
pub use session::rotation::{RotatedSession, SessionRotator};
pub use session::{NewSession, Session, SessionEntry, SessionId};
pub use storage::memory::MemoryAuthBackend;
pub use storage::{AuthBackend, DistributedCache, decode_user, encode_user, session_key};
pub use tenant::{TenantProvisioner, TenantResolution, TenantResolver};

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tessera_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError, TenancyMode};
    pub use crate::cookie::CookieConfig;
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::gate::{AuthContext, AuthenticationGate, CurrentUser, GateOutcome, MaybeUser};
    pub use crate::session::cache::{CacheStats, SessionCache};
    pub use crate::session::rotation::{RotatedSession, SessionRotator};
    pub use crate::session::{NewSession, Session, SessionEntry, SessionId};
    pub use crate::storage::{AuthBackend, DistributedCache, session_key};
    pub use crate::tenant::{TenantProvisioner, TenantResolution, TenantResolver};
}
