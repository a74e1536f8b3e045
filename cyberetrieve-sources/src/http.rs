//! Shared HTTP client construction and the authenticated client handle.
//!
//! Every adapter instance builds its own [`reqwest::Client`] from its
//! [`ProviderConfig`]. A successful authentication hands back an
//! [`AuthedClient`] that pairs that client with the credential, so no
//! secret ever lives in shared state.

use crate::config::ProviderConfig;
use crate::error::SourceError;
use std::fmt;
use std::time::Duration;

/// User-Agent sent when the config does not set one.
const DEFAULT_USER_AGENT: &str = concat!("cyberetrieve/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] configured for provider API calls.
///
/// # Errors
///
/// Returns [`SourceError::Config`] if the config is invalid, or
/// [`SourceError::Http`] if the client cannot be constructed.
pub fn build_client(config: &ProviderConfig) -> Result<reqwest::Client, SourceError> {
    config.validate()?;
    let ua = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned());

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SourceError::Http(format!("failed to build HTTP client: {e}")))
}

/// An HTTP client bound to the credential that authenticated it.
///
/// Returned by [`Provider::auth`](crate::Provider::auth) and passed back
/// into [`Provider::search`](crate::Provider::search).
#[derive(Clone)]
pub struct AuthedClient {
    http: reqwest::Client,
    secret: String,
}

impl AuthedClient {
    /// Pair a client with the credential it was authenticated with.
    pub fn new(http: reqwest::Client, secret: impl Into<String>) -> Self {
        Self {
            http,
            secret: secret.into(),
        }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The credential (key or token) for this provider.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for AuthedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthedClient")
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}
