//! In-memory auth backend.
//!
//! Source of truth for development, demos, and tests. Accounts and sessions
//! live in process memory; passwords are stored as Argon2id hashes exactly
//! like a persistent backend would store them.

use crate::error::AuthError;
use crate::session::{NewSession, Session, SessionId};
use crate::storage::AuthBackend;
use crate::AuthResult;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tessera_core::User;
use time::OffsetDateTime;
use uuid::Uuid;

struct StoredUser {
    user: User,
    password_hash: String,
}

/// Auth backend holding everything in process memory.
pub struct MemoryAuthBackend {
    users: DashMap<Uuid, StoredUser>,
    by_email: DashMap<String, Uuid>,
    sessions: DashMap<SessionId, Session>,
    available: AtomicBool,
}

impl MemoryAuthBackend {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            by_email: DashMap::new(),
            sessions: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Register an account with a password.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the email is already registered.
    pub fn create_user(&self, user: User, password: &str) -> AuthResult<User> {
        let email_key = user.email.to_lowercase();
        if self.by_email.contains_key(&email_key) {
            return Err(AuthError::storage(format!(
                "email already registered: {}",
                user.email
            )));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))?
            .to_string();

        self.by_email.insert(email_key, user.id);
        self.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    /// Toggle simulated reachability. While unavailable, every operation
    /// fails with a transient error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn check_available(&self) -> AuthResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthError::backend_unavailable("auth backend offline"))
        }
    }
}

impl Default for MemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthBackend for MemoryAuthBackend {
    async fn validate_session(&self, id: &SessionId) -> AuthResult<Option<User>> {
        self.check_available()?;

        let session = match self.sessions.get(id) {
            Some(session) => session.clone(),
            None => return Ok(None),
        };
        if session.is_expired() {
            self.sessions.remove(id);
            return Ok(None);
        }
        Ok(self
            .users
            .get(&session.user_id)
            .map(|stored| stored.user.clone()))
    }

    async fn create_session(&self, new_session: NewSession) -> AuthResult<Session> {
        self.check_available()?;

        if !self.users.contains_key(&new_session.user_id) {
            return Err(AuthError::storage(format!(
                "cannot create session for unknown user {}",
                new_session.user_id
            )));
        }

        let session = Session {
            id: SessionId::generate(),
            user_id: new_session.user_id,
            tenant_id: new_session.tenant_id,
            created_at: OffsetDateTime::now_utc(),
            expires_at: new_session.expires_at,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn destroy_session(&self, id: &SessionId) -> AuthResult<()> {
        self.check_available()?;

        match self.sessions.remove(id) {
            Some(_) => Ok(()),
            None => Err(AuthError::InvalidSession),
        }
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> AuthResult<Option<User>> {
        self.check_available()?;

        let user_id = match self.by_email.get(&email.to_lowercase()) {
            Some(id) => *id,
            None => return Ok(None),
        };
        let stored = match self.users.get(&user_id) {
            Some(stored) => stored,
            None => return Ok(None),
        };

        let parsed_hash = PasswordHash::new(&stored.password_hash)
            .map_err(|e| AuthError::internal(format!("stored hash unreadable: {e}")))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
        {
            Ok(Some(stored.user.clone()))
        } else {
            Ok(None)
        }
    }

    async fn ping(&self) -> AuthResult<()> {
        self.check_available()
    }
}
