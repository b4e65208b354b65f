//! Storage interfaces for session authentication.
//!
//! Two seams are defined here: [`AuthBackend`], the source of truth for
//! accounts and sessions, and [`DistributedCache`], the optional
//! cross-instance session cache that sits between the in-process cache and
//! the backend.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Treat session ids as secrets; never log them whole
//! - Answer `validate_session` with `Ok(None)` for unknown or expired ids,
//!   reserving errors for infrastructure faults
//! - Make `destroy_session` report unknown ids as [`AuthError::InvalidSession`]
//!   so callers can distinguish "already gone" from "unreachable"

pub mod memory;

use crate::AuthResult;
use crate::session::{NewSession, Session, SessionId};
use async_trait::async_trait;
use std::time::Duration;
use tessera_core::{TenantId, User};

/// Source of truth for accounts and sessions.
///
/// Every cache tier above this trait holds snapshots of its answers; a miss
/// in those tiers always falls through to here.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Resolves a session id to its user.
    ///
    /// # Returns
    ///
    /// `Ok(Some(user))` for a live session, `Ok(None)` when the backend
    /// positively knows the session is absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure faults, never for an
    /// unknown session id.
    async fn validate_session(&self, id: &SessionId) -> AuthResult<Option<User>>;

    /// Creates a session and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the record cannot
    /// be stored.
    async fn create_session(&self, new_session: NewSession) -> AuthResult<Session>;

    /// Destroys a session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSession`](crate::AuthError::InvalidSession)
    /// if the backend positively knows the session does not exist, or an
    /// infrastructure error if it cannot tell.
    async fn destroy_session(&self, id: &SessionId) -> AuthResult<()>;

    /// Verifies login credentials.
    ///
    /// # Returns
    ///
    /// `Ok(Some(user))` on a match, `Ok(None)` for a wrong email or
    /// password. The two are deliberately indistinguishable to callers.
    async fn verify_credentials(&self, email: &str, password: &str) -> AuthResult<Option<User>>;

    /// Liveness probe used by health reporting.
    async fn ping(&self) -> AuthResult<()> {
        Ok(())
    }
}

/// Cross-instance session cache.
///
/// Values are serialized user snapshots. Implementations absorb their own
/// transport errors: a failed read is a miss, a failed write is dropped.
/// Losing this tier degrades latency, never correctness.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Fetches a value, or `None` on miss or transport failure.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores a value with a TTL. Best-effort.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Removes a value and broadcasts the invalidation to peers. Best-effort.
    async fn delete(&self, key: &str);

    /// Whether the backing store is currently reachable.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Cache key for a session, namespaced by tenant when one is resolved.
///
/// Tenant-scoped keys keep one tenant's sessions invisible to lookups made
/// under another tenant's namespace.
pub fn session_key(tenant: Option<&TenantId>, id: &SessionId) -> String {
    match tenant {
        Some(tenant) => format!("session:{}:{}", tenant, id),
        None => format!("session:{}", id),
    }
}

/// Serialize a user snapshot for the distributed cache.
pub fn encode_user(user: &User) -> AuthResult<Vec<u8>> {
    rmp_serde::to_vec(user)
        .map_err(|e| crate::AuthError::internal(format!("user snapshot encoding failed: {e}")))
}

/// Deserialize a user snapshot from the distributed cache.
pub fn decode_user(bytes: &[u8]) -> AuthResult<User> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| crate::AuthError::internal(format!("user snapshot decoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_namespacing() {
        let id = SessionId::new("abc123");
        let tenant = TenantId::new("acme").unwrap();

        assert_eq!(session_key(Some(&tenant), &id), "session:acme:abc123");
        assert_eq!(session_key(None, &id), "session:abc123");
    }

    #[test]
    fn test_session_keys_disjoint_across_tenants() {
        let id = SessionId::new("abc123");
        let acme = TenantId::new("acme").unwrap();
        let globex = TenantId::new("globex").unwrap();

        assert_ne!(
            session_key(Some(&acme), &id),
            session_key(Some(&globex), &id)
        );
        assert_ne!(session_key(Some(&acme), &id), session_key(None, &id));
    }

    #[test]
    fn test_user_snapshot_roundtrip() {
        use tessera_core::Role;

        let user = User::new(uuid::Uuid::new_v4(), "editor@example.com", Role::Editor)
            .with_tenant(TenantId::new("acme").unwrap())
            .with_permissions(vec!["posts:edit".to_string()]);

        let bytes = encode_user(&user).unwrap();
        let decoded = decode_user(&bytes).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_user(&[0xc1, 0xff, 0x00]).is_err());
    }
}
