//! Error types for the retrieval engine.

/// Errors surfaced by [`RetrieveEngine`](crate::RetrieveEngine).
///
/// Only configuration errors and
/// [`NoUsableProvider`](Self::NoUsableProvider) ever escape a retrieval;
/// per-provider failures are logged and absorbed.
#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    /// Invalid engine configuration, detected before any network I/O.
    #[error("config error: {0}")]
    Config(String),

    /// A selected provider rejected the session credential.
    #[error("{provider} auth err, please check your {provider} credential")]
    AuthFailed {
        /// Name of the provider that failed authentication.
        provider: String,
    },

    /// No selected provider could be authenticated.
    #[error("no usable search engine: {0}")]
    NoUsableProvider(String),

    /// A provider adapter could not be configured.
    #[error(transparent)]
    Source(#[from] cyberetrieve_sources::SourceError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RetrieveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config() {
        let err = RetrieveError::Config("query number can't below 0".into());
        assert_eq!(err.to_string(), "config error: query number can't below 0");
    }

    #[test]
    fn display_auth_failed_names_provider() {
        let err = RetrieveError::AuthFailed {
            provider: "QUAKE".into(),
        };
        assert_eq!(
            err.to_string(),
            "QUAKE auth err, please check your QUAKE credential"
        );
    }

    #[test]
    fn display_no_usable_provider() {
        let err = RetrieveError::NoUsableProvider("please choose a search engine".into());
        assert_eq!(
            err.to_string(),
            "no usable search engine: please choose a search engine"
        );
    }

    #[test]
    fn source_error_converts_transparently() {
        let err: RetrieveError =
            cyberetrieve_sources::SourceError::Config("timeout_seconds must be > 0".into()).into();
        assert!(matches!(err, RetrieveError::Source(_)));
        assert_eq!(err.to_string(), "config error: timeout_seconds must be > 0");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RetrieveError>();
    }
}
