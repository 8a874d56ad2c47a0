use std::fmt;

use serde_json::Value as JsonValue;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("session data has no usable `id`")]
    RestoreRejected,
    #[error("authentication failed{}: {body}", status_suffix(.status))]
    AuthenticationFailed {
        status: Option<u16>,
        body: FailureBody,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session store error: {0}")]
    Store(String),
    #[error("cannot move session from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl Error {
    /// Server-provided failure payload, if this is an authentication failure.
    #[must_use]
    pub fn failure_body(&self) -> Option<&FailureBody> {
        match self {
            Self::AuthenticationFailed { body, .. } => Some(body),
            _ => None,
        }
    }

    pub(crate) fn transition(from: &crate::session::SessionState, to: &'static str) -> Self {
        Self::InvalidTransition {
            from: from.name(),
            to,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Error payload of a rejected login: the server's JSON body when it parses,
/// the raw response text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureBody {
    Json(JsonValue),
    Text(String),
}

impl FailureBody {
    /// Classifies a raw response body.
    #[must_use]
    pub fn from_response_text(text: String) -> Self {
        match serde_json::from_str::<JsonValue>(&text) {
            Ok(json) => Self::Json(json),
            Err(_) => Self::Text(text),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(json) => Some(json),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for FailureBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(json) => write!(f, "{json}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}
