use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::{Value as JsonValue, json};
use tokio::task::AbortHandle;
use url::Url;

use crate::config::AuthenticatorConfig;
use crate::error::{Error, FailureBody};
use crate::session::{ID_FIELD, SessionData};
use crate::traits::Authenticator;

/// Session fields revoked on logout, each sent as its own request.
pub const REVOCABLE_TOKEN_FIELDS: [&str; 1] = [ID_FIELD];

/// Authenticator for LoopBack's built-in `User` login/logout routes.
///
/// Revocation is best-effort: [`invalidate`](Authenticator::invalidate)
/// completes whether or not the logout requests succeed, so the caller can
/// always drop the local session.
pub struct LoopbackAuthenticator {
    config: AuthenticatorConfig,
    http: reqwest::Client,
    refresh_timer: Mutex<Option<AbortHandle>>,
}

impl LoopbackAuthenticator {
    #[must_use]
    pub fn new(config: AuthenticatorConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            refresh_timer: Mutex::new(None),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    /// Register the task that will refresh the session token.
    ///
    /// A previously registered task is aborted. The task is aborted and
    /// forgotten when the session is invalidated.
    pub fn set_refresh_timer(&self, handle: AbortHandle) {
        if let Some(previous) = self.refresh_timer().replace(handle) {
            previous.abort();
        }
    }

    #[must_use]
    pub fn has_refresh_timer(&self) -> bool {
        self.refresh_timer().is_some()
    }

    fn cancel_refresh_timer(&self) {
        if let Some(handle) = self.refresh_timer().take() {
            handle.abort();
        }
    }

    fn refresh_timer(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.refresh_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// POST `body` as JSON, asking for a JSON response.
    async fn make_request(
        &self,
        url: Url,
        body: &JsonValue,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.http
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(body)
            .send()
            .await
    }

    async fn revoke(&self, url: Url, token_type_hint: &'static str, token: &JsonValue) {
        let body = json!({ "token_type_hint": token_type_hint, "token": token });

        match self.make_request(url, &body).await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(token_type_hint, "Token revoked");
            }
            Ok(response) => {
                tracing::warn!(
                    token_type_hint,
                    status = response.status().as_u16(),
                    "Token revocation rejected, invalidating session anyway"
                );
            }
            Err(e) => {
                tracing::warn!(
                    token_type_hint,
                    error = %e,
                    "Token revocation request failed, invalidating session anyway"
                );
            }
        }
    }

    /// Turns a login response into session data or the failure to report.
    async fn read_login_response(response: reqwest::Response) -> Result<SessionData, Error> {
        let status = response.status();
        let text = response.text().await.map_err(transport_failure)?;

        if !status.is_success() {
            return Err(Error::AuthenticationFailed {
                status: Some(status.as_u16()),
                body: FailureBody::from_response_text(text),
            });
        }

        let json = match serde_json::from_str::<JsonValue>(&text) {
            Ok(json) => json,
            Err(_) => {
                return Err(Error::AuthenticationFailed {
                    status: Some(status.as_u16()),
                    body: FailureBody::Text(text),
                });
            }
        };

        SessionData::try_from(json).map_err(|other| Error::AuthenticationFailed {
            status: Some(status.as_u16()),
            body: FailureBody::Json(other),
        })
    }
}

impl Authenticator for LoopbackAuthenticator {
    async fn restore(&self, data: SessionData) -> Result<SessionData, Error> {
        if data.is_restorable() {
            Ok(data)
        } else {
            Err(Error::RestoreRejected)
        }
    }

    /// Only `email` and `password` are sent; `_scope` is accepted and ignored.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
        _scope: &[String],
    ) -> Result<SessionData, Error> {
        let url = self.config.login_url()?;
        let body = json!({ "email": email, "password": password });

        tracing::debug!(url = %url, "Sending login request");

        let result = match self.make_request(url, &body).await {
            Ok(response) => Self::read_login_response(response).await,
            Err(e) => Err(transport_failure(e)),
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Login failed");
        }
        result
    }

    async fn invalidate(&self, data: &SessionData) {
        match self.config.logout_url() {
            Ok(Some(url)) => {
                let revocations: Vec<_> = REVOCABLE_TOKEN_FIELDS
                    .iter()
                    .filter_map(|&field| data.token_value(field).map(|token| (field, token)))
                    .map(|(field, token)| self.revoke(url.clone(), field, token))
                    .collect();
                join_all(revocations).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Skipping token revocation");
            }
        }

        self.cancel_refresh_timer();
    }
}

fn transport_failure(e: reqwest::Error) -> Error {
    Error::AuthenticationFailed {
        status: None,
        body: FailureBody::Text(e.to_string()),
    }
}
