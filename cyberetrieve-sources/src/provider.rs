//! Trait definition for pluggable search provider adapters.
//!
//! Each provider (FOFA, Quake, Hunter) implements [`Provider`] to give the
//! engine a uniform way to authenticate, search, and translate queries.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::SourceError;
use crate::http::AuthedClient;
use crate::types::{Query, SearchResult, Session};

/// A lazily populated stream of results from one provider.
pub type ResultStream = Pin<Box<dyn Stream<Item = SearchResult> + Send>>;

/// How a grammar spells an equality clause and a boolean OR.
///
/// Used by deep search to append a `cert` clause next to a `domain`
/// clause in the grammar the query is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClauseSyntax {
    /// Separator between keyword and value (`:` or `=`).
    pub delimiter: char,
    /// Boolean OR operator (`OR` or `||`).
    pub or_operator: &'static str,
}

impl ClauseSyntax {
    /// The generic `keyword:"value"` syntax, also spoken by Quake.
    pub const GENERIC: Self = Self {
        delimiter: ':',
        or_operator: "OR",
    };

    /// The `keyword="value"` syntax used by FOFA and Hunter.
    pub const EQUALS: Self = Self {
        delimiter: '=',
        or_operator: "||",
    };

    /// `query` widened with an OR'd certificate clause for `domain`.
    pub fn or_cert(&self, query: &str, domain: &str) -> String {
        format!(
            r#"{query} {} cert{}"{domain}""#,
            self.or_operator, self.delimiter
        )
    }
}

/// A pluggable cyberspace-asset search provider.
///
/// Implementors talk to one remote API. Each handles its own:
///
/// - credential validation, yielding an [`AuthedClient`] on success
/// - request construction and pagination
/// - decoding into normalised [`SearchResult`] values
/// - translation of the generic query into its native grammar
///
/// All implementations must be `Send + Sync` for concurrent dispatch.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider identifier, also the key for query overrides.
    fn name(&self) -> &str;

    /// Validate the session credential for this provider.
    ///
    /// Returns `None` when the credential is missing or rejected, or when
    /// the remote cannot be reached.
    async fn auth(&self, session: &Session) -> Option<AuthedClient>;

    /// Start a search and return its result stream immediately.
    ///
    /// The stream is fed by a background task that paginates until the
    /// requested count is reached, the remote runs out of data, or the
    /// remote returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the search cannot be started at all.
    async fn search(
        &self,
        client: &AuthedClient,
        query: &Query,
    ) -> Result<ResultStream, SourceError>;

    /// Translate a generic `keyword:value` query into this provider's grammar.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Grammar`] if the query uses a keyword or shape
    /// the grammar cannot express.
    fn translate(&self, generic: &str) -> Result<String, SourceError>;

    /// The clause syntax of this provider's grammar.
    fn clause_syntax(&self) -> ClauseSyntax {
        ClauseSyntax::GENERIC
    }
}

/// Create a bounded result channel and the stream reading from it.
///
/// Adapters move the sender into their pagination task; dropping it ends
/// the stream.
pub fn result_channel(capacity: usize) -> (mpsc::Sender<SearchResult>, ResultStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, Box::pin(ReceiverStream::new(rx)))
}

/// Reject a query that resolves to nothing to search for.
pub(crate) fn require_query_text<'a>(provider: &str, text: &'a str) -> Result<&'a str, SourceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SourceError::Query(format!("{provider}: empty query")));
    }
    Ok(text)
}
