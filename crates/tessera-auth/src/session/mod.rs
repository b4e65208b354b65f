//! Session types, id generation, and the session cache tiers.

pub mod cache;
pub mod cooldown;
pub mod rotation;

use base64::engine::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{TenantId, Timestamp, User, now_utc};
use time::OffsetDateTime;
use uuid::Uuid;

/// Opaque session identifier carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a session id received from a cookie. The value is opaque;
    /// unknown ids simply miss every lookup.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh session id.
    ///
    /// 256 bits of CSPRNG output, encoded as base64url without padding
    /// (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Server-side session record held by the auth backend.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: Uuid,
    pub tenant_id: Option<TenantId>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub tenant_id: Option<TenantId>,
    pub expires_at: OffsetDateTime,
}

impl NewSession {
    /// Session for `user_id` expiring `lifetime` from now.
    pub fn expiring_in(user_id: Uuid, tenant_id: Option<TenantId>, lifetime: Duration) -> Self {
        Self {
            user_id,
            tenant_id,
            expires_at: OffsetDateTime::now_utc() + lifetime,
        }
    }
}

/// Cached user snapshot for a validated session.
///
/// Freshness is judged against `cached_at`, never against sweep cycles;
/// a stale entry is treated as absent even if no sweep has run yet.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub user: Arc<User>,
    pub cached_at: Timestamp,
}

impl SessionEntry {
    pub fn new(user: Arc<User>) -> Self {
        Self {
            user,
            cached_at: now_utc(),
        }
    }

    /// Whether the snapshot is still within its TTL.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.age() < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Role;

    #[test]
    fn test_generate_session_id_shape() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 43);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_session_ids_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_expiry() {
        let session = Session {
            id: SessionId::generate(),
            user_id: Uuid::new_v4(),
            tenant_id: None,
            created_at: OffsetDateTime::now_utc(),
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
        };
        assert!(!session.is_expired());

        let expired = Session {
            expires_at: OffsetDateTime::now_utc() - time::Duration::seconds(1),
            ..session
        };
        assert!(expired.is_expired());
    }

    #[test]
    fn test_new_session_expiring_in() {
        let new_session =
            NewSession::expiring_in(Uuid::new_v4(), None, Duration::from_secs(3600));
        let remaining = new_session.expires_at - OffsetDateTime::now_utc();
        assert!(remaining.whole_seconds() > 3590);
        assert!(remaining.whole_seconds() <= 3600);
    }

    #[test]
    fn test_entry_freshness() {
        let user = Arc::new(User::new(Uuid::new_v4(), "a@example.com", Role::Editor));
        let entry = SessionEntry::new(user);
        assert!(entry.is_fresh(Duration::from_secs(60)));
        assert!(!entry.is_fresh(Duration::ZERO));
    }

    #[test]
    fn test_stale_entry_detected_without_sweep() {
        let user = Arc::new(User::new(Uuid::new_v4(), "a@example.com", Role::Editor));
        let entry = SessionEntry {
            user,
            cached_at: Timestamp::new(OffsetDateTime::now_utc() - time::Duration::hours(2)),
        };
        assert!(!entry.is_fresh(Duration::from_secs(3600)));
    }
}
