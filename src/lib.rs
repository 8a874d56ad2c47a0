#![doc = include_str!("../README.md")]

#[cfg(feature = "http")]
pub mod authenticator;
pub mod authorizer;
#[cfg(feature = "http")]
pub mod config;
pub mod error;
pub mod manager;
pub mod session;
pub mod traits;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "http")]
pub use authenticator::{LoopbackAuthenticator, REVOCABLE_TOKEN_FIELDS};
pub use authorizer::{AUTHORIZATION_HEADER, CREDENTIAL_FIELDS, LoopbackAuthorizer, credential};
#[cfg(feature = "http")]
pub use config::{AuthenticatorConfig, DEFAULT_LOGIN_ENDPOINT};
pub use error::{Error, FailureBody};
pub use manager::SessionManager;
pub use session::{SessionData, SessionState};
pub use traits::{Authenticator, Authorizer, SessionStore, StoreError};
pub use types::Credential;
