use crate::session::SessionData;
use crate::traits::Authorizer;
use crate::types::Credential;

/// Header the credential is sent in.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Session fields consulted for a credential, highest priority first.
pub const CREDENTIAL_FIELDS: [&str; 3] = ["id", "code", "access_token"];

/// First usable credential in `data`, following [`CREDENTIAL_FIELDS`] order.
///
/// A numeric zero is skipped like an empty string, so `{"id": 0, "code": "c"}`
/// yields `c`.
#[must_use]
pub fn credential(data: &SessionData) -> Option<Credential> {
    CREDENTIAL_FIELDS
        .iter()
        .filter(|field| {
            data.token_value(field)
                .is_some_and(|value| value.as_f64() != Some(0.0))
        })
        .find_map(|field| data.token(field))
        .map(Credential)
}

/// Sends the LoopBack access token as a bare `Authorization` header.
///
/// ```text
/// Authorization: 234rtgjneroigne4
/// ```
///
/// No scheme prefix is added; LoopBack reads the raw token.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackAuthorizer;

impl LoopbackAuthorizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Authorizer for LoopbackAuthorizer {
    fn authorize(&self, data: &SessionData, emit: &mut dyn FnMut(&str, &str)) {
        if let Some(credential) = credential(data) {
            emit(AUTHORIZATION_HEADER, credential.as_str());
        }
    }
}

#[cfg(feature = "http")]
impl LoopbackAuthorizer {
    /// Insert the credential header into `headers`.
    ///
    /// Credentials that are not valid header values are skipped and the
    /// headers are left untouched.
    pub fn authorize_headers(&self, data: &SessionData, headers: &mut reqwest::header::HeaderMap) {
        use reqwest::header::{HeaderName, HeaderValue};

        self.authorize(data, &mut |name, value| {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(mut value)) => {
                    value.set_sensitive(true);
                    headers.insert(name, value);
                }
                _ => tracing::warn!(
                    header = name,
                    "Credential is not a valid header value, sending request without it"
                ),
            }
        });
    }

    /// Attach the credential header to an outgoing request.
    #[must_use]
    pub fn authorize_request(
        &self,
        data: &SessionData,
        request: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        let mut headers = reqwest::header::HeaderMap::new();
        self.authorize_headers(data, &mut headers);
        request.headers(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn emitted(data: &SessionData) -> Vec<(String, String)> {
        let mut calls = Vec::new();
        LoopbackAuthorizer.authorize(data, &mut |name, value| {
            calls.push((name.to_owned(), value.to_owned()));
        });
        calls
    }

    #[test]
    fn credential_lookup_table() {
        let cases = [
            (SessionData::new().with("id", "tok123"), Some("tok123")),
            (SessionData::new().with("code", "c1"), Some("c1")),
            (SessionData::new().with("access_token", "at"), Some("at")),
            (SessionData::new().with("id", "a").with("code", "b"), Some("a")),
            (
                SessionData::new().with("code", "b").with("access_token", "c"),
                Some("b"),
            ),
            (SessionData::new().with("id", "").with("code", "b"), Some("b")),
            (SessionData::new().with("id", 7), Some("7")),
            (SessionData::new().with("id", 0).with("code", "c"), Some("c")),
            (SessionData::new().with("id", 0), None),
            (SessionData::new().with("userId", "u1"), None),
            (SessionData::new(), None),
        ];

        for (data, expected) in cases {
            assert_eq!(
                credential(&data).as_ref().map(Credential::as_str),
                expected,
                "data: {data:?}"
            );
        }
    }

    #[test]
    fn emits_id_once() {
        let data = SessionData::new().with("id", "tok123");
        assert_eq!(
            emitted(&data),
            vec![("Authorization".to_owned(), "tok123".to_owned())]
        );
    }

    #[test]
    fn falls_back_to_code() {
        let data = SessionData::new().with("code", "c1");
        assert_eq!(
            emitted(&data),
            vec![("Authorization".to_owned(), "c1".to_owned())]
        );
    }

    #[test]
    fn no_credential_no_emit() {
        assert!(emitted(&SessionData::new()).is_empty());
        assert!(emitted(&SessionData::new().with("id", "").with("code", "")).is_empty());
    }

    #[test]
    fn id_wins_over_code() {
        let data = SessionData::new().with("id", "a").with("code", "b");
        assert_eq!(emitted(&data), vec![("Authorization".to_owned(), "a".to_owned())]);
    }

    #[cfg(feature = "http")]
    #[test]
    fn header_map_gets_raw_token() {
        let mut headers = reqwest::header::HeaderMap::new();
        LoopbackAuthorizer.authorize_headers(&SessionData::new().with("id", "tok123"), &mut headers);

        let value = headers.get(reqwest::header::AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), "tok123");
        assert!(value.is_sensitive());
    }

    #[cfg(feature = "http")]
    #[test]
    fn invalid_header_value_is_skipped() {
        let mut headers = reqwest::header::HeaderMap::new();
        LoopbackAuthorizer
            .authorize_headers(&SessionData::new().with("id", "bad\ntoken"), &mut headers);

        assert!(headers.is_empty());
    }
}
