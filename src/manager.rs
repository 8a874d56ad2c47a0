//! Session lifecycle driver.
//!
//! [`SessionManager`] composes an [`Authenticator`], an [`Authorizer`] and a
//! [`SessionStore`], and owns the [`SessionState`] they move through:
//!
//! ```rust,ignore
//! use loopback_auth::{
//!     AuthenticatorConfig, LoopbackAuthenticator, LoopbackAuthorizer, SessionManager,
//! };
//!
//! let authenticator = LoopbackAuthenticator::new(AuthenticatorConfig::from_env()?);
//! let session = SessionManager::new(authenticator, LoopbackAuthorizer, my_store);
//!
//! // At startup: pick up a persisted session, if it is still usable.
//! session.restore().await?;
//!
//! if !session.is_authenticated() {
//!     session.authenticate("ada@example.com", "secret", &[]).await?;
//! }
//!
//! session.authorize(&mut |name, value| {
//!     request_headers.insert(name.to_owned(), value.to_owned());
//! });
//!
//! session.invalidate().await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::session::{SessionData, SessionState};
use crate::traits::{Authenticator, Authorizer, SessionStore};

pub struct SessionManager<A, Z, S> {
    authenticator: A,
    authorizer: Z,
    store: S,
    state: Mutex<SessionState>,
    /// Set when a logout could not clear the store; the snapshot there is stale.
    stale_snapshot: AtomicBool,
}

impl<A, Z, S> SessionManager<A, Z, S>
where
    A: Authenticator,
    Z: Authorizer,
    S: SessionStore,
{
    #[must_use]
    pub fn new(authenticator: A, authorizer: Z, store: S) -> Self {
        Self {
            authenticator,
            authorizer,
            store,
            state: Mutex::new(SessionState::Unauthenticated),
            stale_snapshot: AtomicBool::new(false),
        }
    }

    /// Snapshot of the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock_state().is_authenticated()
    }

    /// Current session data, while a session exists.
    #[must_use]
    pub fn data(&self) -> Option<SessionData> {
        self.lock_state().data().cloned()
    }

    #[must_use]
    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resume the persisted session, if the store holds one the
    /// authenticator accepts.
    ///
    /// Returns `Ok(true)` when the session is now authenticated. A rejected
    /// snapshot is removed from the store and reported as `Ok(false)`. A
    /// snapshot left behind by a logout whose store clear failed is never
    /// resumed: the clear is retried instead.
    ///
    /// If the returned future is dropped before completion the session goes
    /// back to unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless unauthenticated, or
    /// [`Error::Store`] if the store cannot be read or a stale snapshot
    /// still cannot be cleared.
    pub async fn restore(&self) -> Result<bool, Error> {
        let transition = self.begin_session()?;

        if self.stale_snapshot.load(Ordering::SeqCst) {
            self.store
                .clear()
                .await
                .map_err(|e| Error::Store(e.to_string()))?;
            self.stale_snapshot.store(false, Ordering::SeqCst);
            tracing::debug!("Cleared snapshot left behind by logout");
            return Ok(false);
        }

        let data = match self.store.load().await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(false),
            Err(e) => return Err(Error::Store(e.to_string())),
        };

        match self.authenticator.restore(data).await {
            Ok(data) => {
                transition.commit(SessionState::Authenticated(data));
                tracing::info!("Session restored");
                Ok(true)
            }
            Err(Error::RestoreRejected) => {
                transition.commit(SessionState::Unauthenticated);
                tracing::debug!("Persisted session rejected, discarding it");
                if let Err(e) = self.store.clear().await {
                    tracing::warn!(error = %e, "Failed to discard rejected session");
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Log in and persist the resulting session.
    ///
    /// If the returned future is dropped before completion the session goes
    /// back to unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless unauthenticated, the
    /// authenticator's error if login fails, or [`Error::Store`] if the new
    /// session cannot be persisted. The session is unauthenticated after any error.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        scope: &[String],
    ) -> Result<SessionData, Error> {
        let transition = self.begin_session()?;

        let data = self
            .authenticator
            .authenticate(email, password, scope)
            .await?;

        self.store
            .persist(&data)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        self.stale_snapshot.store(false, Ordering::SeqCst);

        transition.commit(SessionState::Authenticated(data.clone()));
        tracing::info!("Session authenticated");
        Ok(data)
    }

    /// End the session and clear the store.
    ///
    /// Revocation failures never keep the session alive: once the
    /// authenticator's `invalidate` completes, the session is unauthenticated.
    /// If the returned future is dropped before that, the session stays
    /// authenticated, since nothing was ended locally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless authenticated, or
    /// [`Error::Store`] if the store cannot be cleared. The session is
    /// unauthenticated in the latter case, and the next [`restore`](Self::restore)
    /// retries the clear instead of resuming the stale snapshot.
    pub async fn invalidate(&self) -> Result<(), Error> {
        let (transition, data) = {
            let mut state = self.lock_state();
            let SessionState::Authenticated(data) = &*state else {
                return Err(Error::transition(&state, "invalidating"));
            };
            let data = data.clone();
            let previous =
                std::mem::replace(&mut *state, SessionState::Invalidating(data.clone()));
            (Transition::new(&self.state, previous), data)
        };

        self.authenticator.invalidate(&data).await;
        transition.commit(SessionState::Unauthenticated);
        tracing::info!("Session invalidated");

        if let Err(e) = self.store.clear().await {
            self.stale_snapshot.store(true, Ordering::SeqCst);
            return Err(Error::Store(e.to_string()));
        }
        Ok(())
    }

    /// Let the authorizer add credentials for an outgoing request.
    /// Does nothing without an authenticated session.
    pub fn authorize(&self, emit: &mut dyn FnMut(&str, &str)) {
        let data = {
            let state = self.lock_state();
            match &*state {
                SessionState::Authenticated(data) => data.clone(),
                _ => return,
            }
        };
        self.authorizer.authorize(&data, emit);
    }

    fn begin_session(&self) -> Result<Transition<'_>, Error> {
        let mut state = self.lock_state();
        if !state.can_begin_session() {
            return Err(Error::transition(&state, "authenticating"));
        }
        *state = SessionState::Authenticating;
        Ok(Transition::new(&self.state, SessionState::Unauthenticated))
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }
}

/// In-flight state change. Puts `rollback` back on drop unless committed,
/// so an error return or a dropped future never leaves a transient state behind.
struct Transition<'a> {
    state: &'a Mutex<SessionState>,
    rollback: Option<SessionState>,
}

impl<'a> Transition<'a> {
    fn new(state: &'a Mutex<SessionState>, rollback: SessionState) -> Self {
        Self {
            state,
            rollback: Some(rollback),
        }
    }

    fn commit(mut self, next: SessionState) {
        self.rollback = None;
        *lock(self.state) = next;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.rollback.take() {
            *lock(self.state) = previous;
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::*;
    use crate::authorizer::LoopbackAuthorizer;
    use crate::error::FailureBody;
    use crate::traits::StoreError;

    #[derive(Default)]
    struct MemoryStore {
        data: Mutex<Option<SessionData>>,
        fail_persist: bool,
        fail_clear: AtomicBool,
    }

    impl MemoryStore {
        fn holding(data: SessionData) -> Self {
            Self {
                data: Mutex::new(Some(data)),
                ..Self::default()
            }
        }

        fn snapshot(&self) -> Option<SessionData> {
            self.data.lock().unwrap().clone()
        }
    }

    impl SessionStore for MemoryStore {
        async fn load(&self) -> Result<Option<SessionData>, StoreError> {
            Ok(self.snapshot())
        }

        async fn persist(&self, data: &SessionData) -> Result<(), StoreError> {
            if self.fail_persist {
                return Err("disk full".into());
            }
            *self.data.lock().unwrap() = Some(data.clone());
            Ok(())
        }

        async fn clear(&self) -> Result<(), StoreError> {
            if self.fail_clear.load(Ordering::SeqCst) {
                return Err("read-only".into());
            }
            *self.data.lock().unwrap() = None;
            Ok(())
        }
    }

    /// Accepts password "secret" only and never answers "slow"; counts invalidations.
    #[derive(Default)]
    struct FakeAuthenticator {
        invalidations: Arc<AtomicUsize>,
        stall_logout: bool,
    }

    impl Authenticator for FakeAuthenticator {
        async fn restore(&self, data: SessionData) -> Result<SessionData, Error> {
            if data.is_restorable() {
                Ok(data)
            } else {
                Err(Error::RestoreRejected)
            }
        }

        async fn authenticate(
            &self,
            email: &str,
            password: &str,
            _scope: &[String],
        ) -> Result<SessionData, Error> {
            if password == "slow" {
                return std::future::pending().await;
            }
            if password == "secret" {
                Ok(SessionData::new().with("id", "tok123").with("email", email))
            } else {
                Err(Error::AuthenticationFailed {
                    status: Some(401),
                    body: FailureBody::Json(json!({"error": "invalid"})),
                })
            }
        }

        async fn invalidate(&self, _data: &SessionData) {
            if self.stall_logout {
                std::future::pending::<()>().await;
            }
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    type TestManager = SessionManager<FakeAuthenticator, LoopbackAuthorizer, MemoryStore>;

    fn manager(store: MemoryStore) -> TestManager {
        SessionManager::new(FakeAuthenticator::default(), LoopbackAuthorizer, store)
    }

    fn headers(session: &TestManager) -> Vec<(String, String)> {
        let mut out = Vec::new();
        session.authorize(&mut |name, value| out.push((name.to_owned(), value.to_owned())));
        out
    }

    #[tokio::test]
    async fn restore_with_valid_snapshot_authenticates() {
        let data = SessionData::new().with("id", "abc");
        let session = manager(MemoryStore::holding(data.clone()));

        assert!(session.restore().await.unwrap());
        assert_eq!(session.state(), SessionState::Authenticated(data));
    }

    #[tokio::test]
    async fn restore_with_empty_store_stays_unauthenticated() {
        let session = manager(MemoryStore::default());

        assert!(!session.restore().await.unwrap());
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn rejected_snapshot_is_discarded() {
        let session = manager(MemoryStore::holding(SessionData::new().with("id", "")));

        assert!(!session.restore().await.unwrap());
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(session.store().snapshot(), None);
    }

    #[tokio::test]
    async fn login_persists_and_authorizes() {
        let session = manager(MemoryStore::default());

        let data = session.authenticate("a@b.c", "secret", &[]).await.unwrap();

        assert!(session.is_authenticated());
        assert_eq!(session.store().snapshot(), Some(data));
        assert_eq!(
            headers(&session),
            vec![("Authorization".to_owned(), "tok123".to_owned())]
        );
    }

    #[tokio::test]
    async fn failed_login_returns_to_unauthenticated() {
        let session = manager(MemoryStore::default());

        let err = session.authenticate("a@b.c", "wrong", &[]).await.unwrap_err();

        assert_eq!(
            err.failure_body(),
            Some(&FailureBody::Json(json!({"error": "invalid"})))
        );
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(headers(&session).is_empty());
    }

    #[tokio::test]
    async fn persist_failure_aborts_login() {
        let store = MemoryStore {
            fail_persist: true,
            ..MemoryStore::default()
        };
        let session = manager(store);

        let err = session.authenticate("a@b.c", "secret", &[]).await.unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn login_while_authenticated_is_rejected() {
        let session = manager(MemoryStore::default());
        session.authenticate("a@b.c", "secret", &[]).await.unwrap();

        let err = session.authenticate("a@b.c", "secret", &[]).await.unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: "authenticated",
                to: "authenticating"
            }
        ));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn invalidate_clears_state_and_store() {
        let session = manager(MemoryStore::default());
        session.authenticate("a@b.c", "secret", &[]).await.unwrap();

        session.invalidate().await.unwrap();

        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(session.store().snapshot(), None);
        assert_eq!(session.authenticator().invalidations.load(Ordering::SeqCst), 1);
        assert!(headers(&session).is_empty());
    }

    #[tokio::test]
    async fn invalidate_without_session_is_rejected() {
        let session = manager(MemoryStore::default());

        let err = session.invalidate().await.unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: "unauthenticated",
                to: "invalidating"
            }
        ));
        assert_eq!(session.authenticator().invalidations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_login_returns_to_unauthenticated() {
        let session = manager(MemoryStore::default());

        let attempt = timeout(
            Duration::from_millis(20),
            session.authenticate("a@b.c", "slow", &[]),
        )
        .await;

        assert!(attempt.is_err());
        assert_eq!(session.state(), SessionState::Unauthenticated);

        session.authenticate("a@b.c", "secret", &[]).await.unwrap();
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn cancelled_logout_keeps_session() {
        let authenticator = FakeAuthenticator {
            stall_logout: true,
            ..FakeAuthenticator::default()
        };
        let data = SessionData::new().with("id", "abc");
        let session = SessionManager::new(
            authenticator,
            LoopbackAuthorizer,
            MemoryStore::holding(data.clone()),
        );
        assert!(session.restore().await.unwrap());

        let attempt = timeout(Duration::from_millis(20), session.invalidate()).await;

        assert!(attempt.is_err());
        assert_eq!(session.state(), SessionState::Authenticated(data.clone()));
        assert_eq!(session.store().snapshot(), Some(data));
    }

    #[tokio::test]
    async fn failed_store_clear_is_retried_on_restore() {
        let session = manager(MemoryStore::default());
        session.authenticate("a@b.c", "secret", &[]).await.unwrap();
        session.store().fail_clear.store(true, Ordering::SeqCst);

        let err = session.invalidate().await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(session.store().snapshot().is_some());

        let err = session.restore().await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(session.state(), SessionState::Unauthenticated);

        session.store().fail_clear.store(false, Ordering::SeqCst);
        assert!(!session.restore().await.unwrap());
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(session.store().snapshot(), None);

        assert!(!session.restore().await.unwrap());
    }
}
