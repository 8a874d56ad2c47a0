use url::Url;

use crate::error::Error;

/// Default LoopBack login route for the built-in `User` model.
pub const DEFAULT_LOGIN_ENDPOINT: &str = "/User/login";

/// LoopBack authenticator configuration.
///
/// The base URL is a constructor parameter; endpoints default to the
/// stock LoopBack routes and can be overridden by chaining:
///
/// ```rust,ignore
/// use loopback_auth::AuthenticatorConfig;
///
/// let config = AuthenticatorConfig::new("https://api.example.com".parse()?)
///     .with_login_endpoint("/api/Users/login")
///     .with_logout_endpoint(Some("/api/Users/logout".into()));
/// ```
///
/// Endpoints are joined onto the base URL, so an absolute endpoint URL
/// replaces the base entirely.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthenticatorConfig {
    pub(crate) base_url: Url,
    pub(crate) login_endpoint: String,
    pub(crate) logout_endpoint: Option<String>,
}

impl AuthenticatorConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.into(),
            logout_endpoint: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `LOOPBACK_BASE_URL`: API origin the endpoints are resolved against
    ///
    /// # Optional env vars
    /// - `LOOPBACK_LOGIN_ENDPOINT`: Override the login endpoint
    /// - `LOOPBACK_LOGOUT_ENDPOINT`: Enable token revocation on logout (empty disables)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base_url_str = std::env::var("LOOPBACK_BASE_URL")
            .map_err(|_| Error::Config("LOOPBACK_BASE_URL is required".into()))?;
        let base_url: Url = base_url_str
            .parse()
            .map_err(|e| Error::Config(format!("LOOPBACK_BASE_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let Ok(endpoint) = std::env::var("LOOPBACK_LOGIN_ENDPOINT") {
            config = config.with_login_endpoint(endpoint);
        }
        if let Ok(endpoint) = std::env::var("LOOPBACK_LOGOUT_ENDPOINT") {
            config = config.with_logout_endpoint(Some(endpoint));
        }

        config.login_url()?;
        config.logout_url()?;
        Ok(config)
    }

    /// Override the login endpoint (default: [`DEFAULT_LOGIN_ENDPOINT`]).
    #[must_use]
    pub fn with_login_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.login_endpoint = endpoint.into();
        self
    }

    /// Set the revocation endpoint. `None` or an empty string disables revocation.
    #[must_use]
    pub fn with_logout_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.logout_endpoint = endpoint.filter(|e| !e.is_empty());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn login_endpoint(&self) -> &str {
        &self.login_endpoint
    }

    #[must_use]
    pub fn logout_endpoint(&self) -> Option<&str> {
        self.logout_endpoint.as_deref()
    }

    /// Absolute login URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint cannot be joined onto the base URL.
    pub fn login_url(&self) -> Result<Url, Error> {
        self.resolve(&self.login_endpoint)
    }

    /// Absolute logout URL, or `None` when revocation is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint cannot be joined onto the base URL.
    pub fn logout_url(&self) -> Result<Option<Url>, Error> {
        self.logout_endpoint
            .as_deref()
            .map(|endpoint| self.resolve(endpoint))
            .transpose()
    }

    fn resolve(&self, endpoint: &str) -> Result<Url, Error> {
        self.base_url
            .join(endpoint)
            .map_err(|e| Error::Config(format!("endpoint `{endpoint}`: {e}")))
    }
}
