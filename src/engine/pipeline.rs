//! Fan-out workers, their supervisor, and the merge stage.
//!
//! Each authenticated provider gets one worker task that forwards its
//! result stream into a bounded merge channel. A single merge stage drains
//! that channel, drops duplicates, and hands every first occurrence to both
//! the accumulated collection and the live channel. The live channel closes
//! only after every worker has finished.

use std::sync::{Arc, Mutex};

use cyberetrieve_sources::{Provider, Query, QueryLimit, SearchResult};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use super::auth::AuthedProvider;
use super::dedup::Deduplicator;
use super::lock;

/// Everything one retrieval run needs once the gate has passed.
pub(crate) struct Pipeline {
    pub(crate) providers: Vec<AuthedProvider>,
    pub(crate) query: Arc<Mutex<Query>>,
    pub(crate) auto_grammar: bool,
    pub(crate) limit: QueryLimit,
    pub(crate) capacity: usize,
    pub(crate) results: Arc<Mutex<Vec<SearchResult>>>,
}

impl Pipeline {
    /// Start the run. `published` is dropped, closing the live channel,
    /// when the returned task completes.
    pub(crate) fn spawn(self, published: mpsc::Sender<SearchResult>) -> JoinHandle<()> {
        tokio::spawn(self.run(published))
    }

    async fn run(self, published: mpsc::Sender<SearchResult>) {
        let Pipeline {
            providers,
            query,
            auto_grammar,
            limit,
            capacity,
            results,
        } = self;

        let (merge_tx, mut merge_rx) = mpsc::channel(capacity.max(1));
        let mut workers = JoinSet::new();
        for authed in providers {
            workers.spawn(worker(
                authed,
                Arc::clone(&query),
                auto_grammar,
                merge_tx.clone(),
            ));
        }
        drop(merge_tx);
        let supervisor = tokio::spawn(supervise(workers));

        let mut dedup = Deduplicator::new(limit);
        let mut live = true;
        while !dedup.is_full() {
            let Some(result) = merge_rx.recv().await else {
                break;
            };
            if !dedup.admit(&result) {
                continue;
            }
            lock(&results).push(result.clone());
            if live && published.send(result).await.is_err() {
                tracing::debug!("live receiver dropped, accumulating only");
                live = false;
            }
        }

        // Workers notice the closed merge channel and stop.
        drop(merge_rx);
        if let Err(err) = supervisor.await {
            tracing::error!(error = %err, "worker supervisor failed");
        }
        tracing::info!(distinct = dedup.len(), "retrieval done");
        drop(published);
    }
}

/// Wait for every worker, logging the ones that panicked.
async fn supervise(mut workers: JoinSet<()>) {
    while let Some(outcome) = workers.join_next().await {
        if let Err(err) = outcome {
            tracing::error!(error = %err, "provider worker did not finish cleanly");
        }
    }
}

async fn worker(
    authed: AuthedProvider,
    query: Arc<Mutex<Query>>,
    auto_grammar: bool,
    merge: mpsc::Sender<SearchResult>,
) {
    let provider = authed.provider.as_ref();
    let name = provider.name();
    let resolved = resolve_query(provider, &query, auto_grammar);

    let mut stream = match provider.search(&authed.client, &resolved).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(provider = name, error = %err, "search failed");
            return;
        }
    };

    let mut forwarded = 0usize;
    loop {
        tokio::select! {
            _ = merge.closed() => break,
            next = stream.next() => {
                let Some(result) = next else { break };
                if merge.send(result).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
        }
    }
    tracing::debug!(provider = name, forwarded, "worker finished");
}

/// The query a provider should run, filling in a translated override first
/// when auto-grammar is on and none is set.
///
/// A translation is stored in the shared query so it is visible after the
/// run. A failed translation leaves the generic query in place.
fn resolve_query(provider: &dyn Provider, query: &Mutex<Query>, auto_grammar: bool) -> Query {
    let mut query = lock(query);
    let name = provider.name();
    if auto_grammar && query.override_for(name).is_none() {
        match provider.translate(&query.query) {
            Ok(translated) if !translated.is_empty() => {
                tracing::trace!(provider = name, query = %translated, "translated query");
                query.overrides.insert(name.to_owned(), translated);
            }
            Ok(_) => tracing::debug!(provider = name, "empty translation, using generic query"),
            Err(err) => tracing::warn!(
                provider = name,
                error = %err,
                "grammar translation failed, using generic query"
            ),
        }
    }
    query.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyberetrieve_sources::{FofaProvider, HunterProvider, QuakeProvider};

    fn shared(query: Query) -> Mutex<Query> {
        Mutex::new(query)
    }

    #[test]
    fn translation_stored_as_override() {
        let query = shared(Query::new(r#"title:"login""#, 10));
        let resolved = resolve_query(&FofaProvider::default(), &query, true);
        assert_eq!(resolved.for_provider("FOFA"), r#"title="login""#);
        assert_eq!(
            lock(&query).override_for("FOFA"),
            Some(r#"title="login""#)
        );
    }

    #[test]
    fn auto_grammar_off_leaves_query_alone() {
        let query = shared(Query::new(r#"title:"login""#, 10));
        let resolved = resolve_query(&FofaProvider::default(), &query, false);
        assert_eq!(resolved.for_provider("FOFA"), r#"title:"login""#);
        assert!(lock(&query).overrides.is_empty());
    }

    #[test]
    fn existing_override_is_kept() {
        let query = shared(Query::new(r#"title:"login""#, 10).with_override("QUAKE", "custom"));
        let resolved = resolve_query(&QuakeProvider::default(), &query, true);
        assert_eq!(resolved.for_provider("QUAKE"), "custom");
    }

    #[test]
    fn failed_translation_falls_back_to_generic() {
        let query = shared(Query::new(r#"foo:"bar""#, 10));
        let (quake, fofa, hunter) = (
            QuakeProvider::default(),
            FofaProvider::default(),
            HunterProvider::default(),
        );
        let providers: [&dyn Provider; 3] = [&quake, &fofa, &hunter];
        for provider in providers {
            let resolved = resolve_query(provider, &query, true);
            assert_eq!(resolved.for_provider(provider.name()), r#"foo:"bar""#);
        }
        assert!(lock(&query).overrides.is_empty());
    }
}
