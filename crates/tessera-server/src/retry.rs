//! Bounded retry with exponential backoff for backend calls.
//!
//! Only transient faults ([`AuthError::is_transient`]) are retried, and only
//! for idempotent reads. Mutations (create, destroy) pass through unchanged:
//! a retry after an ambiguous failure could apply them twice.

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tessera_auth::session::{NewSession, Session, SessionId};
use tessera_auth::storage::AuthBackend;
use tessera_auth::{AuthError, AuthResult};
use tessera_core::User;
use tracing::warn;

/// Exponential backoff schedule for retried backend calls.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Ceiling for any single delay.
    pub max: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-based), capped at `max`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry as i32);
        let delay = self.initial.mul_f64(factor);
        delay.min(self.max)
    }
}

/// Run `operation` until it succeeds, fails non-transiently, or the attempt
/// budget runs out. The last error is returned as-is.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    operation: &str,
    mut call: F,
) -> AuthResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AuthResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<AuthError> = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.delay_for(attempt - 1);
            counter!("tessera_backend_retries_total", "operation" => operation.to_string())
                .increment(1);
            tokio::time::sleep(delay).await;
        }
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                warn!(
                    operation,
                    attempt = attempt + 1,
                    error = %e,
                    "transient backend failure, will retry"
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    // Reachable only when the final attempt failed transiently.
    Err(last_err
        .unwrap_or_else(|| AuthError::internal(format!("retry budget exhausted for {operation}"))))
}

/// [`AuthBackend`] wrapper that retries transient failures of idempotent
/// reads. Writes are delegated without retry.
pub struct ResilientBackend<B> {
    inner: Arc<B>,
    policy: BackoffPolicy,
}

impl<B> ResilientBackend<B> {
    pub fn new(inner: Arc<B>, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<B: AuthBackend> AuthBackend for ResilientBackend<B> {
    async fn validate_session(&self, id: &SessionId) -> AuthResult<Option<User>> {
        retry_with_backoff(&self.policy, "validate_session", || {
            self.inner.validate_session(id)
        })
        .await
    }

    async fn create_session(&self, new_session: NewSession) -> AuthResult<Session> {
        self.inner.create_session(new_session).await
    }

    async fn destroy_session(&self, id: &SessionId) -> AuthResult<()> {
        self.inner.destroy_session(id).await
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> AuthResult<Option<User>> {
        retry_with_backoff(&self.policy, "verify_credentials", || {
            self.inner.verify_credentials(email, password)
        })
        .await
    }

    async fn ping(&self) -> AuthResult<()> {
        retry_with_backoff(&self.policy, "ping", || self.inner.ping()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(4),
            multiplier: 2.0,
            max_attempts,
        }
    }

    #[test]
    fn test_delay_growth_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_secs(2));
        assert_eq!(policy.delay_for(30), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AuthError::backend_unavailable("flaky"))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: AuthResult<u32> = retry_with_backoff(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AuthError::storage("still down")) }
        })
        .await;
        assert!(matches!(result, Err(AuthError::Storage { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: AuthResult<u32> = retry_with_backoff(&fast_policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AuthError::InvalidSession) }
        })
        .await;
        assert!(matches!(result, Err(AuthError::InvalidSession)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct FlakyBackend {
        validate_calls: AtomicU32,
        destroy_calls: AtomicU32,
        failures_before_success: u32,
    }

    #[async_trait]
    impl AuthBackend for FlakyBackend {
        async fn validate_session(&self, _id: &SessionId) -> AuthResult<Option<User>> {
            let n = self.validate_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(AuthError::backend_unavailable("connection reset"))
            } else {
                Ok(None)
            }
        }

        async fn create_session(&self, _new_session: NewSession) -> AuthResult<Session> {
            Err(AuthError::backend_unavailable("connection reset"))
        }

        async fn destroy_session(&self, _id: &SessionId) -> AuthResult<()> {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            Err(AuthError::backend_unavailable("connection reset"))
        }

        async fn verify_credentials(
            &self,
            _email: &str,
            _password: &str,
        ) -> AuthResult<Option<User>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_resilient_backend_retries_validation() {
        let backend = Arc::new(FlakyBackend {
            validate_calls: AtomicU32::new(0),
            destroy_calls: AtomicU32::new(0),
            failures_before_success: 2,
        });
        let resilient = ResilientBackend::new(backend.clone(), fast_policy(3));

        let result = resilient
            .validate_session(&SessionId::new("abc123"))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(backend.validate_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resilient_backend_does_not_retry_mutations() {
        let backend = Arc::new(FlakyBackend {
            validate_calls: AtomicU32::new(0),
            destroy_calls: AtomicU32::new(0),
            failures_before_success: 0,
        });
        let resilient = ResilientBackend::new(backend.clone(), fast_policy(3));

        let result = resilient.destroy_session(&SessionId::new("abc123")).await;
        assert!(result.is_err());
        assert_eq!(backend.destroy_calls.load(Ordering::SeqCst), 1);
    }
}
