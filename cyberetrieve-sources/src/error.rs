//! Error types for the cyberetrieve-sources crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. No API keys or tokens appear in error
//! messages.

/// Errors that can occur while talking to a search provider.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// An HTTP request to a provider failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to decode a provider response.
    #[error("parse error: {0}")]
    Parse(String),

    /// A generic query could not be expressed in a provider grammar.
    #[error("grammar error: {0}")]
    Grammar(String),

    /// The query handed to a provider is unusable.
    #[error("query error: {0}")]
    Query(String),

    /// Invalid provider configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for cyberetrieve-sources results.
pub type Result<T> = std::result::Result<T, SourceError>;
