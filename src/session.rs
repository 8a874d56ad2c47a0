use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Field holding the primary bearer credential in LoopBack session data.
pub const ID_FIELD: &str = "id";

/// Persisted session record, as returned by the login endpoint.
///
/// The authenticator reads only the token fields (`id`, `code`,
/// `access_token`); everything else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(Map<String, JsonValue>);

impl SessionData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Raw value of `field`, if it holds a usable token.
    ///
    /// Strings must be non-empty. Numbers always count, since LoopBack
    /// backends configured with numeric ids send them unquoted. Any other
    /// JSON type counts as absent.
    #[must_use]
    pub fn token_value(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field).filter(|value| match value {
            JsonValue::String(s) => !s.is_empty(),
            JsonValue::Number(_) => true,
            _ => false,
        })
    }

    /// Token of `field` as text, if present and non-empty.
    #[must_use]
    pub fn token(&self, field: &str) -> Option<String> {
        self.token_value(field).map(|value| match value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Whether this record can re-establish a session: `id` is present and non-empty.
    #[must_use]
    pub fn is_restorable(&self) -> bool {
        self.token(ID_FIELD).is_some()
    }

}

impl From<Map<String, JsonValue>> for SessionData {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl TryFrom<JsonValue> for SessionData {
    type Error = JsonValue;

    /// Only JSON objects are session data; anything else is handed back.
    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

impl From<SessionData> for JsonValue {
    fn from(data: SessionData) -> Self {
        JsonValue::Object(data.0)
    }
}

/// Where a session stands in its credential lifecycle.
///
/// - `Unauthenticated` → `Authenticating` when a login or restore starts
/// - `Authenticating` → `Authenticated` on success, `Unauthenticated` on failure
/// - `Authenticated` → `Invalidating` → `Unauthenticated` on logout
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated(SessionData),
    Invalidating(SessionData),
}

impl SessionState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated(_) => "authenticated",
            Self::Invalidating(_) => "invalidating",
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Session data, while a session exists (authenticated or being invalidated).
    #[must_use]
    pub fn data(&self) -> Option<&SessionData> {
        match self {
            Self::Authenticated(data) | Self::Invalidating(data) => Some(data),
            Self::Unauthenticated | Self::Authenticating => None,
        }
    }

    /// Whether a session may start (by login or restore) from this state.
    #[must_use]
    pub fn can_begin_session(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }

    /// Whether invalidation may start from this state.
    #[must_use]
    pub fn can_invalidate(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
