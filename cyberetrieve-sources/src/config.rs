//! Provider connection configuration with sensible defaults.
//!
//! [`ProviderConfig`] controls where an adapter sends its requests and how
//! long it waits. The defaults point at each provider's public API host.

use crate::error::SourceError;

/// Connection settings for a single provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Scheme and host of the provider API, without a trailing slash.
    pub base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Custom User-Agent string. If `None`, the crate default is sent.
    pub user_agent: Option<String>,
}

impl ProviderConfig {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

    /// Create a config for the given API host with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_seconds: Self::DEFAULT_TIMEOUT_SECONDS,
            user_agent: None,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set a custom User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Join an API path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `base_url` must be an `http://` or `https://` URL
    /// - `timeout_seconds` must be greater than 0
    pub fn validate(&self) -> Result<(), SourceError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SourceError::Config(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(SourceError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
