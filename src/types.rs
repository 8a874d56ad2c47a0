use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Opaque bearer credential taken from session data.
///
/// Sent verbatim as the `Authorization` header value, with no scheme prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct Credential(pub String);

impl Credential {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Credential {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
