//! Session rotation.
//!
//! Long-lived session cookies are re-issued on a fixed cadence so a leaked
//! cookie value has a bounded useful life. Rotation is best-effort: a
//! transient failure leaves the current session serving, and only a backend
//! verdict that the current session no longer exists aborts the request.

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::cookie::CookieConfig;
use crate::error::AuthError;
use crate::session::cache::SessionCache;
use crate::session::{NewSession, Session, SessionEntry, SessionId};
use crate::storage::{AuthBackend, DistributedCache, encode_user, session_key};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::counter;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{TenantId, User};
use tracing::{debug, info, warn};

/// Rate-gating bookkeeping for one session id.
///
/// Records exist purely to space rotation attempts; they are seeded when a
/// session is issued, re-keyed to the replacement id on rotation, and
/// discarded after sitting idle.
#[derive(Debug, Clone)]
pub struct RotationRecord {
    pub last_rotated_at: Instant,
}

struct IpWindow {
    window_start: Instant,
    count: u32,
}

/// Outcome of a successful rotation.
#[derive(Debug)]
pub struct RotatedSession {
    /// The replacement session.
    pub session: Session,
    /// `Set-Cookie` header value pointing the browser at the new id.
    pub set_cookie: String,
}

/// Rotates authenticated sessions at most once per interval per session,
/// bounded independently per client IP.
pub struct SessionRotator {
    backend: Arc<dyn AuthBackend>,
    cache: Arc<SessionCache>,
    distributed: Arc<dyn DistributedCache>,
    cookies: CookieConfig,
    enabled: bool,
    interval: Duration,
    per_ip_limit: u32,
    per_ip_window: Duration,
    record_idle: Duration,
    session_lifetime: Duration,
    cache_ttl: Duration,
    records: DashMap<SessionId, RotationRecord>,
    ip_windows: DashMap<IpAddr, IpWindow>,
}

impl SessionRotator {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        cache: Arc<SessionCache>,
        distributed: Arc<dyn DistributedCache>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            distributed,
            cookies: config.cookie.clone(),
            enabled: config.rotation.enabled,
            interval: config.rotation.interval,
            per_ip_limit: config.rotation.per_ip_limit,
            per_ip_window: config.rotation.per_ip_window,
            record_idle: config.rotation.record_idle,
            session_lifetime: config.session.lifetime,
            cache_ttl: config.session.cache_ttl,
            records: DashMap::new(),
            ip_windows: DashMap::new(),
        }
    }

    /// Seed the rotation record for a freshly issued session so it is not
    /// rotated again before a full interval has passed.
    pub fn note_created(&self, id: &SessionId) {
        self.records.insert(
            id.clone(),
            RotationRecord {
                last_rotated_at: Instant::now(),
            },
        );
    }

    /// Rotate `current_id` if it is due and the client IP has budget left.
    ///
    /// # Returns
    ///
    /// `Ok(Some(_))` when a replacement session was issued, `Ok(None)` when
    /// rotation was not due, was rate-limited, or failed transiently.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSession`] only when the backend reports
    /// that `current_id` no longer exists; the caller must then treat the
    /// request as unauthenticated and clear the cookie.
    pub async fn maybe_rotate(
        &self,
        client_ip: IpAddr,
        user: Arc<User>,
        current_id: &SessionId,
        tenant: Option<&TenantId>,
    ) -> AuthResult<Option<RotatedSession>> {
        if !self.enabled {
            return Ok(None);
        }
        if !self.rotation_due(current_id) {
            return Ok(None);
        }
        if !self.admit_ip(client_ip) {
            debug!(%client_ip, "session rotation skipped: per-IP budget exhausted");
            counter!("tessera_session_rotations_total", "result" => "throttled").increment(1);
            return Ok(None);
        }
        if !self.claim_interval(current_id) {
            // A concurrent request with the same cookie won the claim.
            return Ok(None);
        }

        // The current session stays valid until the replacement exists.
        let new_session = match self
            .backend
            .create_session(NewSession::expiring_in(
                user.id,
                user.tenant_id.clone(),
                self.session_lifetime,
            ))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "session rotation aborted: replacement not created");
                counter!("tessera_session_rotations_total", "result" => "failed").increment(1);
                return Ok(None);
            }
        };

        if let Err(e) = self.backend.destroy_session(current_id).await {
            let _ = self.backend.destroy_session(&new_session.id).await;
            return match e {
                AuthError::InvalidSession => {
                    self.records.remove(current_id);
                    warn!(user_id = %user.id, "session vanished during rotation");
                    counter!("tessera_session_rotations_total", "result" => "fatal").increment(1);
                    Err(AuthError::InvalidSession)
                }
                other => {
                    warn!(user_id = %user.id, error = %other, "session rotation aborted: old session not retired");
                    counter!("tessera_session_rotations_total", "result" => "failed").increment(1);
                    Ok(None)
                }
            };
        }

        // Swap every cache tier over to the new id.
        self.cache.invalidate(current_id).await;
        self.distributed
            .delete(&session_key(tenant, current_id))
            .await;

        self.cache
            .insert(new_session.id.clone(), SessionEntry::new(user.clone()))
            .await;
        match encode_user(&user) {
            Ok(bytes) => {
                self.distributed
                    .set(&session_key(tenant, &new_session.id), bytes, self.cache_ttl)
                    .await;
            }
            Err(e) => warn!(error = %e, "user snapshot not written to distributed cache"),
        }

        self.records.remove(current_id);
        self.note_created(&new_session.id);

        let set_cookie = self
            .cookies
            .build_cookie(new_session.id.as_str(), self.session_lifetime);
        info!(user_id = %user.id, "session rotated");
        counter!("tessera_session_rotations_total", "result" => "rotated").increment(1);

        Ok(Some(RotatedSession {
            session: new_session,
            set_cookie,
        }))
    }

    /// Drop rotation records and IP windows that have sat idle.
    pub fn prune_stale(&self) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| record.last_rotated_at.elapsed() < self.record_idle);
        let removed = before.saturating_sub(self.records.len());

        let window = self.per_ip_window;
        self.ip_windows
            .retain(|_, w| w.window_start.elapsed() < window * 2);
        removed
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn rotation_due(&self, id: &SessionId) -> bool {
        match self.records.get(id) {
            Some(record) => record.last_rotated_at.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Atomically claim the rotation slot for this session. Exactly one of
    /// any set of concurrent callers gets `true` per interval.
    fn claim_interval(&self, id: &SessionId) -> bool {
        let now = Instant::now();
        match self.records.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(occupied.get().last_rotated_at) >= self.interval {
                    occupied.get_mut().last_rotated_at = now;
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RotationRecord {
                    last_rotated_at: now,
                });
                true
            }
        }
    }

    fn admit_ip(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut window = self.ip_windows.entry(ip).or_insert_with(|| IpWindow {
            window_start: now,
            count: 0,
        });
        if now.duration_since(window.window_start) >= self.per_ip_window {
            window.window_start = now;
            window.count = 0;
        }
        if window.count >= self.per_ip_limit {
            return false;
        }
        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryAuthBackend;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use tessera_core::Role;
    use uuid::Uuid;

    struct NullCache;

    #[async_trait]
    impl DistributedCache for NullCache {
        async fn get(&self, _key: &str) -> Option<Vec<u8>> {
            None
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) {}
        async fn delete(&self, _key: &str) {}
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))
    }

    fn config_with_interval(interval: Duration) -> AuthConfig {
        let mut config = AuthConfig::default();
        config.rotation.interval = interval;
        config
    }

    async fn setup(
        config: &AuthConfig,
    ) -> (Arc<MemoryAuthBackend>, SessionRotator, Arc<User>, Session) {
        let backend = Arc::new(MemoryAuthBackend::new());
        let user = backend
            .create_user(
                User::new(Uuid::new_v4(), "editor@example.com", Role::Editor),
                "pw",
            )
            .unwrap();
        let session = backend
            .create_session(NewSession::expiring_in(
                user.id,
                None,
                Duration::from_secs(3600),
            ))
            .await
            .unwrap();

        let cache = Arc::new(SessionCache::with_sizing(10, 100, Duration::from_secs(60)));
        cache
            .insert(session.id.clone(), SessionEntry::new(Arc::new(user.clone())))
            .await;

        let rotator = SessionRotator::new(
            backend.clone() as Arc<dyn AuthBackend>,
            cache,
            Arc::new(NullCache),
            config,
        );
        (backend, rotator, Arc::new(user), session)
    }

    #[tokio::test]
    async fn test_fresh_session_not_rotated() {
        let config = config_with_interval(Duration::from_secs(900));
        let (_, rotator, user, session) = setup(&config).await;
        rotator.note_created(&session.id);

        let rotated = rotator
            .maybe_rotate(ip(), user, &session.id, None)
            .await
            .unwrap();
        assert!(rotated.is_none());
    }

    #[tokio::test]
    async fn test_due_session_rotates() {
        let config = config_with_interval(Duration::from_millis(10));
        let (backend, rotator, user, session) = setup(&config).await;
        rotator.note_created(&session.id);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let rotated = rotator
            .maybe_rotate(ip(), user.clone(), &session.id, None)
            .await
            .unwrap()
            .unwrap();

        assert_ne!(rotated.session.id, session.id);
        assert!(rotated.set_cookie.contains(rotated.session.id.as_str()));

        // Old session destroyed, replacement valid.
        assert!(backend.validate_session(&session.id).await.unwrap().is_none());
        assert_eq!(
            backend
                .validate_session(&rotated.session.id)
                .await
                .unwrap()
                .unwrap()
                .id,
            user.id
        );

        // Bookkeeping moved to the new id.
        assert!(!rotator.records.contains_key(&session.id));
        assert!(rotator.records.contains_key(&rotated.session.id));
    }

    #[tokio::test]
    async fn test_cache_swapped_to_new_id() {
        let config = config_with_interval(Duration::from_millis(0));
        let (_, rotator, user, session) = setup(&config).await;

        let rotated = rotator
            .maybe_rotate(ip(), user, &session.id, None)
            .await
            .unwrap()
            .unwrap();

        assert!(rotator.cache.get(&session.id).await.is_none());
        assert!(rotator.cache.get(&rotated.session.id).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_requests_rotate_at_most_once() {
        let config = config_with_interval(Duration::from_secs(900));
        let (_, rotator, user, session) = setup(&config).await;
        // No record: the first claim wins, everyone else defers.
        let rotator = Arc::new(rotator);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let rotator = rotator.clone();
            let user = user.clone();
            let id = session.id.clone();
            handles.push(tokio::spawn(async move {
                rotator.maybe_rotate(ip(), user, &id, None).await.unwrap()
            }));
        }

        let mut rotations = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                rotations += 1;
            }
        }
        assert_eq!(rotations, 1);
    }

    #[tokio::test]
    async fn test_per_ip_budget_skips_rotation() {
        let mut config = config_with_interval(Duration::ZERO);
        config.rotation.per_ip_limit = 1;
        config.rotation.per_ip_window = Duration::from_secs(3600);
        let (backend, rotator, user, session) = setup(&config).await;

        let first = rotator
            .maybe_rotate(ip(), user.clone(), &session.id, None)
            .await
            .unwrap()
            .unwrap();

        // Same IP, budget spent: due but skipped.
        let second = rotator
            .maybe_rotate(ip(), user.clone(), &first.session.id, None)
            .await
            .unwrap();
        assert!(second.is_none());

        // A different IP still rotates.
        let other_ip = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9));
        let third = rotator
            .maybe_rotate(other_ip, user, &first.session.id, None)
            .await
            .unwrap();
        assert!(third.is_some());
        assert_eq!(backend.session_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_current_session() {
        let config = config_with_interval(Duration::ZERO);
        let (backend, rotator, user, session) = setup(&config).await;

        backend.set_available(false);
        let outcome = rotator
            .maybe_rotate(ip(), user, &session.id, None)
            .await
            .unwrap();
        assert!(outcome.is_none());

        backend.set_available(true);
        assert!(backend.validate_session(&session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_vanished_session_is_fatal() {
        let config = config_with_interval(Duration::ZERO);
        let (backend, rotator, user, session) = setup(&config).await;

        // Concurrent logout beat us to the old session.
        backend.destroy_session(&session.id).await.unwrap();

        let err = rotator
            .maybe_rotate(ip(), user, &session.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSession));
        // The half-created replacement was rolled back.
        assert_eq!(backend.session_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_rotation_never_rotates() {
        let mut config = config_with_interval(Duration::ZERO);
        config.rotation.enabled = false;
        let (_, rotator, user, session) = setup(&config).await;

        let outcome = rotator
            .maybe_rotate(ip(), user, &session.id, None)
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_prune_stale_records() {
        let mut config = config_with_interval(Duration::from_secs(900));
        config.rotation.record_idle = Duration::from_millis(10);
        let (_, rotator, _, session) = setup(&config).await;

        rotator.note_created(&session.id);
        assert_eq!(rotator.record_count(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(rotator.prune_stale(), 1);
        assert_eq!(rotator.record_count(), 0);
    }
}
