//! The retrieval engine: auth gate, fan-out, dedup, and the two consumer
//! surfaces.
//!
//! ```no_run
//! use cyberetrieve::{EngineOption, Query, RetrieveEngine, Session};
//!
//! # async fn demo() -> Result<(), cyberetrieve::RetrieveError> {
//! let session = Session {
//!     fofa_key: "your-fofa-key".into(),
//!     ..Default::default()
//! };
//! let query = Query::new(r#"domain:"example.com""#, 50);
//! let mut engine = RetrieveEngine::new(
//!     query,
//!     session,
//!     [EngineOption::Fofa, EngineOption::AutoGrammar],
//! )?;
//! for result in engine.retrieve().await? {
//!     println!("{} {}", result.ip, result.url);
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
pub mod deep_search;
mod dedup;
mod pipeline;

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use cyberetrieve_sources::{Provider, Query, QueryLimit, SearchResult, Session};
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{EngineConfig, EngineOption, channel_capacity};
use crate::error::{Result, RetrieveError};
use crate::registry::ProviderRegistry;

use self::pipeline::Pipeline;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Concurrent retrieval across every selected provider.
///
/// One engine owns one query. Each call to [`retrieve`](Self::retrieve) or
/// [`retrieve_stream`](Self::retrieve_stream) is an independent run with its
/// own dedup set and result collection.
pub struct RetrieveEngine {
    query: Arc<Mutex<Query>>,
    session: Session,
    config: EngineConfig,
    providers: Vec<Arc<dyn Provider>>,
    channel_capacity: usize,
    results: Arc<Mutex<Vec<SearchResult>>>,
}

impl RetrieveEngine {
    /// Build an engine from a query, credentials, and options applied in order.
    ///
    /// With [`EngineOption::DeepSearch`] the query is rewritten here, once.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieveError::Config`] if the requested count is negative
    /// and not the unlimited sentinel.
    pub fn new(
        query: Query,
        session: Session,
        options: impl IntoIterator<Item = EngineOption>,
    ) -> Result<Self> {
        if QueryLimit::from_count(query.number_of_query).is_none() {
            return Err(RetrieveError::Config(format!(
                "query number can't below 0, got {}",
                query.number_of_query
            )));
        }
        let capacity = channel_capacity(query.number_of_query);
        let config = EngineConfig::from_options(options);
        let providers = ProviderRegistry::resolve(config.selection, &config.custom).into_providers();

        let mut query = query;
        if config.deep_search {
            deep_search::apply(&mut query, &providers);
        }
        tracing::debug!(?config, capacity, "engine configured");

        Ok(Self {
            query: Arc::new(Mutex::new(query)),
            session,
            config,
            providers,
            channel_capacity: capacity,
            results: Arc::default(),
        })
    }

    /// Start a run and return the live receiver immediately.
    ///
    /// The receiver yields each distinct result as it is found and ends
    /// once every provider has finished or the count is reached.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieveError::NoUsableProvider`] if no provider
    /// authenticates.
    pub async fn retrieve_stream(&mut self) -> Result<ResultReceiver> {
        let (receiver, _pipeline) = self.start().await?;
        Ok(receiver)
    }

    /// Run to completion and return every distinct result.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieveError::NoUsableProvider`] if no provider
    /// authenticates.
    pub async fn retrieve(&mut self) -> Result<Vec<SearchResult>> {
        let (mut receiver, pipeline) = self.start().await?;
        let drain = tokio::spawn(async move { while receiver.recv().await.is_some() {} });
        if let Err(err) = pipeline.await {
            tracing::error!(error = %err, "retrieval pipeline failed");
        }
        if let Err(err) = drain.await {
            tracing::error!(error = %err, "result drain failed");
        }
        Ok(self.results())
    }

    /// The query as it stands, including deep-search rewrites and any
    /// translations stored by the last run.
    pub fn query(&self) -> Query {
        lock(&self.query).clone()
    }

    /// Distinct results accumulated by the current or last run.
    pub fn results(&self) -> Vec<SearchResult> {
        lock(&self.results).clone()
    }

    /// Whether auto-grammar is on. The gate turns it on when more than one
    /// provider authenticates.
    pub fn auto_grammar(&self) -> bool {
        self.config.auto_grammar
    }

    /// Names of the selected providers, in dispatch order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    async fn start(&mut self) -> Result<(ResultReceiver, JoinHandle<()>)> {
        let authed = auth::check_sessions(&self.providers, &self.session).await?;
        if authed.len() > 1 && !self.config.auto_grammar {
            tracing::info!(
                providers = authed.len(),
                "multiple providers authenticated, enabling auto grammar"
            );
            self.config.auto_grammar = true;
        }

        self.results = Arc::default();
        let limit = lock(&self.query).limit();
        let (published, rx) = mpsc::channel(self.channel_capacity);
        let pipeline = Pipeline {
            providers: authed,
            query: Arc::clone(&self.query),
            auto_grammar: self.config.auto_grammar,
            limit,
            capacity: self.channel_capacity,
            results: Arc::clone(&self.results),
        };
        Ok((ResultReceiver { rx }, pipeline.spawn(published)))
    }
}

impl fmt::Debug for RetrieveEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrieveEngine")
            .field("config", &self.config)
            .field("providers", &self.provider_names())
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

/// Live, deduplicated results of one run.
///
/// Ends exactly once, after every provider worker has finished.
#[derive(Debug)]
pub struct ResultReceiver {
    rx: mpsc::Receiver<SearchResult>,
}

impl ResultReceiver {
    /// Next result, or `None` once the run is over.
    pub async fn recv(&mut self) -> Option<SearchResult> {
        self.rx.recv().await
    }

    /// Collect every remaining result.
    pub async fn collect_all(mut self) -> Vec<SearchResult> {
        let mut results = Vec::new();
        while let Some(result) = self.rx.recv().await {
            results.push(result);
        }
        results
    }
}

impl Stream for ResultReceiver {
    type Item = SearchResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyberetrieve_sources::UNLIMITED;

    #[test]
    fn negative_count_rejected() {
        let err = RetrieveEngine::new(Query::new("ip:\"1.1.1.1\"", -2), Session::default(), [])
            .err()
            .expect("negative count should fail");
        assert!(matches!(err, RetrieveError::Config(_)));
    }

    #[test]
    fn unlimited_count_accepted() {
        let engine = RetrieveEngine::new(
            Query::new("ip:\"1.1.1.1\"", UNLIMITED),
            Session::default(),
            [EngineOption::Quake],
        )
        .expect("unlimited is valid");
        assert_eq!(engine.channel_capacity, 100);
        assert_eq!(engine.provider_names(), vec!["QUAKE"]);
    }

    #[test]
    fn capacity_uses_count_before_deep_search() {
        let engine = RetrieveEngine::new(
            Query::new(r#"domain:"example.com""#, 30),
            Session::default(),
            [EngineOption::Fofa, EngineOption::DeepSearch],
        )
        .expect("valid");
        assert_eq!(engine.channel_capacity, 10);
        let query = engine.query();
        assert_eq!(query.number_of_query, UNLIMITED);
        assert_eq!(query.query, r#"domain:"example.com" OR cert:"example.com""#);
    }

    #[test]
    fn selection_order_is_fixed() {
        let engine = RetrieveEngine::new(
            Query::new("ip:\"1.1.1.1\"", 5),
            Session::default(),
            [EngineOption::Hunter, EngineOption::Quake, EngineOption::Hunter],
        )
        .expect("valid");
        assert_eq!(engine.provider_names(), vec!["QUAKE", "HUNTER"]);
        assert!(!engine.auto_grammar());
    }

    #[tokio::test]
    async fn no_selection_is_fatal_on_retrieve() {
        let mut engine =
            RetrieveEngine::new(Query::new("ip:\"1.1.1.1\"", 5), Session::default(), [])
                .expect("valid");
        let err = engine.retrieve().await.err().expect("nothing selected");
        assert!(matches!(err, RetrieveError::NoUsableProvider(_)));
        assert!(engine.results().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_network() {
        let mut engine = RetrieveEngine::new(
            Query::new("ip:\"1.1.1.1\"", 5),
            Session::default(),
            [EngineOption::Quake, EngineOption::Fofa, EngineOption::Hunter],
        )
        .expect("valid");
        let err = engine.retrieve_stream().await.err().expect("no credentials");
        let message = err.to_string();
        assert!(message.contains("QUAKE auth err"));
        assert!(message.contains("HUNTER auth err"));
    }
}
