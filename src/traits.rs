use std::future::Future;

use crate::error::Error;
use crate::session::SessionData;

/// Boxed error returned by consumer-implemented stores.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Session creation, restoration and termination against an identity backend.
pub trait Authenticator: Send + Sync + 'static {
    /// Accept previously persisted session data, or reject it.
    ///
    /// Never touches the network. Rejects with [`Error::RestoreRejected`]
    /// when `data` has no usable `id`.
    fn restore(
        &self,
        data: SessionData,
    ) -> impl Future<Output = Result<SessionData, Error>> + Send;

    /// Log in with email and password. Resolves with the new session data.
    ///
    /// `scope` is part of the signature so callers can pass it, but it is
    /// not sent to the backend.
    fn authenticate(
        &self,
        email: &str,
        password: &str,
        scope: &[String],
    ) -> impl Future<Output = Result<SessionData, Error>> + Send;

    /// End the session. Always completes; revocation failures are absorbed.
    fn invalidate(&self, data: &SessionData) -> impl Future<Output = ()> + Send;
}

/// Per-request credential injection.
pub trait Authorizer: Send + Sync + 'static {
    /// Call `emit(header_name, header_value)` at most once, if `data` carries a credential.
    fn authorize(&self, data: &SessionData, emit: &mut dyn FnMut(&str, &str));
}

/// Consumer-provided session persistence.
///
/// Holds at most one session snapshot.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for LocalStorage {
///     async fn load(&self) -> Result<Option<SessionData>, StoreError> {
///         Ok(self.read("session")?.map(|raw| serde_json::from_str(&raw)).transpose()?)
///     }
///
///     async fn persist(&self, data: &SessionData) -> Result<(), StoreError> {
///         self.write("session", &serde_json::to_string(data)?)
///     }
///
///     async fn clear(&self) -> Result<(), StoreError> {
///         self.remove("session")
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Read the persisted snapshot, if any.
    fn load(&self) -> impl Future<Output = Result<Option<SessionData>, StoreError>> + Send;

    /// Replace the persisted snapshot.
    fn persist(&self, data: &SessionData) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the persisted snapshot.
    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
