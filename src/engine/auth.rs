//! Authentication gate run once before any search starts.

use std::sync::Arc;

use cyberetrieve_sources::{AuthedClient, Provider, Session};
use futures_util::future::join_all;

use crate::error::{Result, RetrieveError};

/// A provider whose credential was accepted, with the client to search with.
#[derive(Clone)]
pub(crate) struct AuthedProvider {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) client: AuthedClient,
}

/// Authenticate every provider concurrently.
///
/// Failures are logged and dropped while at least one provider succeeds.
/// The authenticated list keeps the input order.
///
/// # Errors
///
/// Returns [`RetrieveError::NoUsableProvider`] when nothing is selected or
/// every provider rejects its credential.
pub(crate) async fn check_sessions(
    providers: &[Arc<dyn Provider>],
    session: &Session,
) -> Result<Vec<AuthedProvider>> {
    if providers.is_empty() {
        return Err(RetrieveError::NoUsableProvider(
            "please choose a search engine".into(),
        ));
    }

    let checks = providers.iter().map(|provider| async move {
        tracing::info!(provider = provider.name(), "checking authorization");
        (provider, provider.auth(session).await)
    });
    let outcomes = join_all(checks).await;

    let mut authed = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (provider, outcome) in outcomes {
        match outcome {
            Some(client) => authed.push(AuthedProvider {
                provider: Arc::clone(provider),
                client,
            }),
            None => failures.push(RetrieveError::AuthFailed {
                provider: provider.name().to_owned(),
            }),
        }
    }

    if authed.is_empty() {
        let reasons: Vec<String> = failures.iter().map(ToString::to_string).collect();
        return Err(RetrieveError::NoUsableProvider(reasons.join("; ")));
    }
    for failure in &failures {
        tracing::warn!(error = %failure, "provider excluded from retrieval");
    }
    tracing::info!(
        authenticated = authed.len(),
        failed = failures.len(),
        "authorization check done"
    );
    Ok(authed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cyberetrieve_sources::{Query, ResultStream, SourceError};

    struct Gate {
        name: &'static str,
        accept: bool,
    }

    #[async_trait]
    impl Provider for Gate {
        fn name(&self) -> &str {
            self.name
        }

        async fn auth(&self, _session: &Session) -> Option<AuthedClient> {
            self.accept
                .then(|| AuthedClient::new(reqwest::Client::new(), format!("{}-key", self.name)))
        }

        async fn search(
            &self,
            _client: &AuthedClient,
            _query: &Query,
        ) -> std::result::Result<ResultStream, SourceError> {
            Err(SourceError::Query("unused".into()))
        }

        fn translate(&self, generic: &str) -> std::result::Result<String, SourceError> {
            Ok(generic.to_owned())
        }
    }

    fn gate(name: &'static str, accept: bool) -> Arc<dyn Provider> {
        Arc::new(Gate { name, accept })
    }

    #[tokio::test]
    async fn nothing_selected_is_fatal() {
        let err = check_sessions(&[], &Session::default())
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, RetrieveError::NoUsableProvider(_)));
    }

    #[tokio::test]
    async fn partial_failure_proceeds_in_order() {
        let providers = vec![gate("A", true), gate("B", false), gate("C", true)];
        let authed = check_sessions(&providers, &Session::default())
            .await
            .expect("should proceed");
        let names: Vec<&str> = authed.iter().map(|a| a.provider.name()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(authed[1].client.secret(), "C-key");
    }

    #[tokio::test]
    async fn all_failed_is_fatal_and_names_providers() {
        let providers = vec![gate("A", false), gate("B", false)];
        let err = check_sessions(&providers, &Session::default())
            .await
            .err()
            .expect("should fail");
        let message = err.to_string();
        assert!(message.starts_with("no usable search engine"));
        assert!(message.contains("A auth err"));
        assert!(message.contains("B auth err"));
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn excluded_provider_is_logged_as_warning() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let providers = vec![gate("A", true), gate("B", false)];
        let authed = check_sessions(&providers, &Session::default())
            .await
            .expect("should proceed");
        assert_eq!(authed.len(), 1);

        let logs = captured.text();
        let warnings: Vec<&str> = logs.lines().filter(|l| l.contains("WARN")).collect();
        assert_eq!(warnings.len(), 1, "logs: {logs}");
        assert!(warnings[0].contains("provider excluded from retrieval"));
        assert!(warnings[0].contains("B auth err, please check your B credential"));
        assert!(!logs.contains("checking authorization"));
    }
}
