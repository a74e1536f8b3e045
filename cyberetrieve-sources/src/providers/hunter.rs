//! Hunter provider: API-key URL parameter, URL-safe base64 queries.
//!
//! Hunter has no dedicated account endpoint: an empty search answers with
//! a fixed "search content cannot be empty" message when the key is valid,
//! which doubles as the credential check.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::config::ProviderConfig;
use crate::error::SourceError;
use crate::http::{build_client, AuthedClient};
use crate::provider::{require_query_text, result_channel, ClauseSyntax, Provider, ResultStream};
use crate::types::{Query, QueryLimit, SearchResult, Session};

use super::{
    last_year_window, null_as_default, parse_generic_clause, DEFAULT_PAGE_SIZE, DEFAULT_PAGE_SIZE_MAX,
};

/// Provider name, also the override key in [`Query::overrides`].
pub const HUNTER: &str = "HUNTER";

/// Public Hunter API host.
pub const DEFAULT_BASE_URL: &str = "https://hunter.qianxin.com";

const SEARCH_PATH: &str = "/openApi/search";

/// Body fragment Hunter answers with when a valid key sends no query.
const EMPTY_SEARCH_MARKER: &str = "搜索内容不能为空";

/// Smallest page Hunter accepts.
const MIN_PAGE_SIZE: usize = 10;

/// Hunter open API adapter.
#[derive(Debug, Clone)]
pub struct HunterProvider {
    config: ProviderConfig,
}

impl HunterProvider {
    /// Create an adapter for the given API host.
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl Default for HunterProvider {
    fn default() -> Self {
        Self::new(ProviderConfig::new(DEFAULT_BASE_URL))
    }
}

#[derive(Debug, Default, Deserialize)]
struct HunterPage {
    #[serde(default)]
    data: Option<HunterData>,
}

#[derive(Debug, Default, Deserialize)]
struct HunterData {
    #[serde(default)]
    arr: Option<Vec<HunterAsset>>,
}

#[derive(Debug, Default, Deserialize)]
struct HunterAsset {
    #[serde(default, deserialize_with = "null_as_default")]
    ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    port: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    domain: String,
    #[serde(default, deserialize_with = "null_as_default")]
    company: String,
    #[serde(default, deserialize_with = "null_as_default")]
    number: String,
}

impl From<HunterAsset> for SearchResult {
    fn from(asset: HunterAsset) -> Self {
        SearchResult {
            ip: asset.ip,
            url: asset.url,
            host: String::new(),
            domain: asset.domain,
            port: asset.port,
            icp_unit: asset.company,
            icp_licence: asset.number,
        }
    }
}

/// Hunter's page size: the default page, shrunk to small counts, half the
/// maximum for large or unlimited counts, and never below ten.
fn hunter_page_size(limit: QueryLimit) -> usize {
    match limit {
        QueryLimit::Unlimited => DEFAULT_PAGE_SIZE_MAX / 2,
        QueryLimit::Limited(n) if n < MIN_PAGE_SIZE => {
            tracing::warn!(
                provider = HUNTER,
                requested = n,
                "query number can't be below {MIN_PAGE_SIZE}, using {MIN_PAGE_SIZE}"
            );
            MIN_PAGE_SIZE
        }
        QueryLimit::Limited(n) if n > DEFAULT_PAGE_SIZE_MAX => DEFAULT_PAGE_SIZE_MAX / 2,
        QueryLimit::Limited(n) => n.min(DEFAULT_PAGE_SIZE),
    }
}

#[async_trait]
impl Provider for HunterProvider {
    fn name(&self) -> &str {
        HUNTER
    }

    async fn auth(&self, session: &Session) -> Option<AuthedClient> {
        if session.hunter_key.is_empty() {
            return None;
        }
        let http = match build_client(&self.config) {
            Ok(http) => http,
            Err(err) => {
                tracing::warn!(provider = HUNTER, error = %err, "cannot build HTTP client");
                return None;
            }
        };

        let body = http
            .get(self.config.endpoint(SEARCH_PATH))
            .query(&[("api-key", session.hunter_key.as_str())])
            .send()
            .await
            .map_err(|e| tracing::debug!(provider = HUNTER, error = %e, "auth request failed"))
            .ok()?
            .text()
            .await
            .map_err(|e| tracing::debug!(provider = HUNTER, error = %e, "auth response unreadable"))
            .ok()?;

        body.contains(EMPTY_SEARCH_MARKER)
            .then(|| AuthedClient::new(http, session.hunter_key.clone()))
    }

    async fn search(
        &self,
        client: &AuthedClient,
        query: &Query,
    ) -> Result<ResultStream, SourceError> {
        let text = require_query_text(HUNTER, query.for_provider(HUNTER))?;
        tracing::trace!(provider = HUNTER, query = text, "search grammar");

        let limit = query.limit();
        let page_size = hunter_page_size(limit);
        let (tx, stream) = result_channel(page_size);
        let request = PageRequest {
            client: client.clone(),
            endpoint: self.config.endpoint(SEARCH_PATH),
            search: URL_SAFE.encode(text.as_bytes()),
            page_size,
        };
        tokio::spawn(paginate(request, limit, tx));
        Ok(stream)
    }

    fn translate(&self, generic: &str) -> Result<String, SourceError> {
        to_hunter_grammar(generic)
    }

    fn clause_syntax(&self) -> ClauseSyntax {
        ClauseSyntax::EQUALS
    }
}

struct PageRequest {
    client: AuthedClient,
    endpoint: String,
    search: String,
    page_size: usize,
}

impl PageRequest {
    async fn fetch(&self, page: usize) -> Result<HunterPage, SourceError> {
        let (from, to) = last_year_window();
        let page = page.to_string();
        let page_size = self.page_size.to_string();
        let start_time = format!("{} 00:00:00", from.format("%Y-%m-%d"));
        let end_time = format!("{} 23:59:59", to.format("%Y-%m-%d"));

        let response = self
            .client
            .http()
            .get(&self.endpoint)
            .query(&[
                ("api-key", self.client.secret()),
                ("search", self.search.as_str()),
                ("page", page.as_str()),
                ("page_size", page_size.as_str()),
                ("is_web", "3"),
                ("start_time", start_time.as_str()),
                ("end_time", end_time.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Http(format!("Hunter request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SourceError::Http(format!(
                "Hunter HTTP status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Hunter response decode failed: {e}")))
    }
}

/// Walk result pages until the count is met or Hunter runs dry.
async fn paginate(request: PageRequest, limit: QueryLimit, tx: mpsc::Sender<SearchResult>) {
    if limit == QueryLimit::Limited(0) {
        return;
    }
    let mut found = 0usize;
    let mut page = 1usize;

    loop {
        let assets = match request.fetch(page).await {
            Ok(body) => body.data.and_then(|d| d.arr).unwrap_or_default(),
            Err(err) => {
                tracing::error!(provider = HUNTER, error = %err, "search error");
                break;
            }
        };
        page += 1;
        if assets.is_empty() {
            break;
        }

        found += assets.len();
        for asset in assets {
            if tx.send(asset.into()).await.is_err() {
                tracing::debug!(provider = HUNTER, "result consumer dropped, stopping");
                return;
            }
        }

        if limit.is_satisfied_by(found) {
            break;
        }
    }

    tracing::info!(provider = HUNTER, found, "search done");
}

/// Translate a single generic clause into Hunter grammar.
///
/// Hunter clauses are `keyword="value"`; the value is quoted exactly once
/// whether or not the generic clause quoted it.
///
/// # Errors
///
/// Returns [`SourceError::Grammar`] for unsupported keywords, negated
/// clauses, or clauses without a `:` delimiter.
pub fn to_hunter_grammar(query: &str) -> Result<String, SourceError> {
    let parsed = parse_generic_clause(query.trim(), HUNTER)?;
    let field = match parsed.keyword {
        _ if parsed.negated => None,
        "ip" => Some("ip"),
        "domain" => Some("domain"),
        "header" => Some("header"),
        "favicon" => Some("web.icon"),
        "cert" => Some("cert"),
        _ => None,
    };
    let field = field.ok_or_else(|| {
        SourceError::Grammar(format!(
            "transfer to HUNTER grammar false: unsupported clause {query:?}"
        ))
    })?;
    let value = parsed
        .value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(parsed.value);
    Ok(format!(r#"{field}="{value}""#))
}
