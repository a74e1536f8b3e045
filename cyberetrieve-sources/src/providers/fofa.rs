//! FOFA provider: key-authenticated REST search with page-numbered results.
//!
//! FOFA takes the API key as a URL parameter and the query as standard
//! base64. Results come back as rows of strings in the order of the
//! requested `fields`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::config::ProviderConfig;
use crate::error::SourceError;
use crate::http::{build_client, AuthedClient};
use crate::provider::{require_query_text, result_channel, ClauseSyntax, Provider, ResultStream};
use crate::types::{Query, QueryLimit, SearchResult, Session};

use super::{generic_clauses, null_as_default, parse_generic_clause, standard_page_size};

/// Provider name, also the override key in [`Query::overrides`].
pub const FOFA: &str = "FOFA";

/// Public FOFA API host.
pub const DEFAULT_BASE_URL: &str = "https://fofa.info";

const AUTH_PATH: &str = "/api/v1/info/my";
const SEARCH_PATH: &str = "/api/v1/search/all";
const FIELDS: &str = "ip,host,port,domain,protocol,icp";

/// FOFA REST API adapter.
#[derive(Debug, Clone)]
pub struct FofaProvider {
    config: ProviderConfig,
}

impl FofaProvider {
    /// Create an adapter for the given API host.
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl Default for FofaProvider {
    fn default() -> Self {
        Self::new(ProviderConfig::new(DEFAULT_BASE_URL))
    }
}

/// Response of the account info endpoint. Only `error` matters.
#[derive(Debug, Deserialize)]
struct FofaAccount {
    error: bool,
}

/// One page of `search/all`.
#[derive(Debug, Default, Deserialize)]
struct FofaSearchPage {
    #[serde(default)]
    error: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    errmsg: String,
    #[serde(default, deserialize_with = "null_as_default")]
    size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<Vec<String>>,
}

impl FofaSearchPage {
    fn has_rows(&self) -> bool {
        !self.error && self.size > 0 && !self.results.is_empty()
    }
}

#[async_trait]
impl Provider for FofaProvider {
    fn name(&self) -> &str {
        FOFA
    }

    async fn auth(&self, session: &Session) -> Option<AuthedClient> {
        if session.fofa_key.is_empty() {
            return None;
        }
        let http = match build_client(&self.config) {
            Ok(http) => http,
            Err(err) => {
                tracing::warn!(provider = FOFA, error = %err, "cannot build HTTP client");
                return None;
            }
        };

        let account: FofaAccount = http
            .get(self.config.endpoint(AUTH_PATH))
            .query(&[("key", session.fofa_key.as_str())])
            .send()
            .await
            .map_err(|e| tracing::debug!(provider = FOFA, error = %e, "auth request failed"))
            .ok()?
            .json()
            .await
            .map_err(|e| tracing::debug!(provider = FOFA, error = %e, "auth response unreadable"))
            .ok()?;

        (!account.error).then(|| AuthedClient::new(http, session.fofa_key.clone()))
    }

    async fn search(
        &self,
        client: &AuthedClient,
        query: &Query,
    ) -> Result<ResultStream, SourceError> {
        let text = require_query_text(FOFA, query.for_provider(FOFA))?;
        tracing::trace!(provider = FOFA, query = text, "search grammar");

        let limit = query.limit();
        let page_size = standard_page_size(limit);
        let (tx, stream) = result_channel(page_size);
        let request = PageRequest {
            client: client.clone(),
            endpoint: self.config.endpoint(SEARCH_PATH),
            qbase64: STANDARD.encode(text.as_bytes()),
            page_size,
        };
        tokio::spawn(paginate(request, limit, tx));
        Ok(stream)
    }

    fn translate(&self, generic: &str) -> Result<String, SourceError> {
        to_fofa_grammar(generic)
    }

    fn clause_syntax(&self) -> ClauseSyntax {
        ClauseSyntax::EQUALS
    }
}

struct PageRequest {
    client: AuthedClient,
    endpoint: String,
    qbase64: String,
    page_size: usize,
}

impl PageRequest {
    async fn fetch(&self, page: usize) -> Result<FofaSearchPage, SourceError> {
        let page = page.to_string();
        let size = self.page_size.to_string();
        self.client
            .http()
            .get(&self.endpoint)
            .query(&[
                ("key", self.client.secret()),
                ("qbase64", self.qbase64.as_str()),
                ("page", page.as_str()),
                ("size", size.as_str()),
                ("full", "false"),
                ("fields", FIELDS),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Http(format!("FOFA request failed: {e}")))?
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("FOFA response decode failed: {e}")))
    }
}

/// Walk result pages until the count is met or FOFA runs dry.
async fn paginate(request: PageRequest, limit: QueryLimit, tx: mpsc::Sender<SearchResult>) {
    if limit == QueryLimit::Limited(0) {
        return;
    }
    let mut found = 0usize;
    let mut page = 1usize;

    loop {
        let body = match request.fetch(page).await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(provider = FOFA, page, error = %err, "page failed");
                break;
            }
        };
        if body.error {
            tracing::warn!(provider = FOFA, message = %body.errmsg, "search rejected");
        }
        if !body.has_rows() {
            break;
        }

        found += body.results.len();
        for row in &body.results {
            let Some(result) = row_to_result(row) else {
                tracing::debug!(provider = FOFA, columns = row.len(), "short row skipped");
                continue;
            };
            if tx.send(result).await.is_err() {
                tracing::debug!(provider = FOFA, "result consumer dropped, stopping");
                return;
            }
        }

        if limit.is_satisfied_by(found) {
            break;
        }
        page += 1;
    }

    tracing::info!(provider = FOFA, found, "search done");
}

/// Map a `ip,host,port,domain,protocol,icp` row to a result.
fn row_to_result(row: &[String]) -> Option<SearchResult> {
    let [ip, host, port, domain, protocol, rest @ ..] = row else {
        return None;
    };
    let url = if host.starts_with("http") {
        host.clone()
    } else {
        format!("{protocol}://{host}")
    };
    Some(SearchResult {
        ip: ip.clone(),
        url,
        host: host.clone(),
        domain: domain.clone(),
        port: port.parse().unwrap_or(0),
        icp_unit: String::new(),
        icp_licence: rest.first().cloned().unwrap_or_default(),
    })
}

/// Translate a generic query into FOFA grammar.
///
/// Clauses joined by `&&` are translated one by one and re-joined with
/// ` && `. A `not ` prefix turns `=` into `!=`.
///
/// # Errors
///
/// Returns [`SourceError::Grammar`] for unsupported keywords or clauses
/// without a `:` delimiter.
///
/// # Examples
///
/// ```
/// use cyberetrieve_sources::providers::fofa::to_fofa_grammar;
///
/// let grammar = to_fofa_grammar(r#"title:"login" && not header:"nginx""#).unwrap();
/// assert_eq!(grammar, r#"title="login" && headers!="nginx""#);
/// ```
pub fn to_fofa_grammar(query: &str) -> Result<String, SourceError> {
    let clauses = generic_clauses(query)
        .map(fofa_clause)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(clauses.join(" && "))
}

fn fofa_clause(clause: &str) -> Result<String, SourceError> {
    let parsed = parse_generic_clause(clause, FOFA)?;
    let field = match parsed.keyword {
        "ip" => "ip",
        "domain" => "domain",
        "header" => "headers",
        "title" => "title",
        "body" => "body",
        _ => {
            return Err(SourceError::Grammar(format!(
                "transfer to FOFA grammar false: unsupported keyword {:?}",
                parsed.keyword
            )))
        }
    };
    let op = if parsed.negated { "!=" } else { "=" };
    Ok(format!("{field}{op}{}", parsed.value))
}
