//! Quake provider: token-header authenticated JSON search with offset paging.
//!
//! Quake authenticates with an `X-QuakeToken` header and pages by result
//! offset (`start`) rather than page number. Its grammar uses `keyword: value`
//! clauses joined with `AND`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::ProviderConfig;
use crate::error::SourceError;
use crate::http::{build_client, AuthedClient};
use crate::provider::{require_query_text, result_channel, Provider, ResultStream};
use crate::types::{Query, QueryLimit, SearchResult, Session};

use super::{
    generic_clauses, last_year_window, null_as_default, parse_generic_clause, standard_page_size,
};

/// Provider name, also the override key in [`Query::overrides`].
pub const QUAKE: &str = "QUAKE";

/// Public Quake API host.
pub const DEFAULT_BASE_URL: &str = "https://quake.360.cn";

const AUTH_PATH: &str = "/api/v3/user/info";
const SEARCH_PATH: &str = "/api/v3/search/quake_service";
const TOKEN_HEADER: &str = "X-QuakeToken";
const SUCCESS_MARKER: &str = "Successful";

/// Quake REST API adapter.
#[derive(Debug, Clone)]
pub struct QuakeProvider {
    config: ProviderConfig,
}

impl QuakeProvider {
    /// Create an adapter for the given API host.
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl Default for QuakeProvider {
    fn default() -> Self {
        Self::new(ProviderConfig::new(DEFAULT_BASE_URL))
    }
}

/// Envelope shared by every Quake endpoint.
#[derive(Debug, Deserialize)]
struct QuakeEnvelope<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    message: String,
    data: Option<T>,
    #[serde(default, deserialize_with = "null_as_default")]
    meta: QuakeMeta,
}

impl<T> QuakeEnvelope<T> {
    fn is_successful(&self) -> bool {
        self.message.contains(SUCCESS_MARKER)
    }
}

#[derive(Debug, Default, Deserialize)]
struct QuakeMeta {
    #[serde(default, deserialize_with = "null_as_default")]
    pagination: QuakePagination,
}

#[derive(Debug, Default, Deserialize)]
struct QuakePagination {
    #[serde(default, deserialize_with = "null_as_default")]
    count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    total: u64,
}

#[derive(Debug, Default, Deserialize)]
struct QuakeAsset {
    #[serde(default, deserialize_with = "null_as_default")]
    ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    port: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    hostname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    domain: String,
    #[serde(default, deserialize_with = "null_as_default")]
    service: QuakeService,
}

#[derive(Debug, Default, Deserialize)]
struct QuakeService {
    #[serde(default, deserialize_with = "null_as_default")]
    http: QuakeHttp,
}

#[derive(Debug, Default, Deserialize)]
struct QuakeHttp {
    #[serde(default, deserialize_with = "null_as_default")]
    http_load_url: Vec<String>,
    #[serde(default)]
    icp: Option<QuakeIcp>,
}

#[derive(Debug, Default, Deserialize)]
struct QuakeIcp {
    #[serde(default, deserialize_with = "null_as_default")]
    main_licence: QuakeLicence,
}

#[derive(Debug, Default, Deserialize)]
struct QuakeLicence {
    #[serde(default, deserialize_with = "null_as_default")]
    unit: String,
    #[serde(default, deserialize_with = "null_as_default")]
    licence: String,
}

/// Body of a `quake_service` search request.
#[derive(Debug, Serialize)]
struct QuakeSearchRequest<'a> {
    query: &'a str,
    start: usize,
    size: usize,
    ignore_cache: bool,
    start_time: String,
    end_time: String,
}

#[async_trait]
impl Provider for QuakeProvider {
    fn name(&self) -> &str {
        QUAKE
    }

    async fn auth(&self, session: &Session) -> Option<AuthedClient> {
        if session.quake_token.is_empty() {
            return None;
        }
        let http = match build_client(&self.config) {
            Ok(http) => http,
            Err(err) => {
                tracing::warn!(provider = QUAKE, error = %err, "cannot build HTTP client");
                return None;
            }
        };

        let info: QuakeEnvelope<serde_json::Value> = http
            .get(self.config.endpoint(AUTH_PATH))
            .header(TOKEN_HEADER, session.quake_token.as_str())
            .send()
            .await
            .map_err(|e| tracing::debug!(provider = QUAKE, error = %e, "auth request failed"))
            .ok()?
            .json()
            .await
            .map_err(|e| tracing::debug!(provider = QUAKE, error = %e, "auth response unreadable"))
            .ok()?;

        info.is_successful()
            .then(|| AuthedClient::new(http, session.quake_token.clone()))
    }

    async fn search(
        &self,
        client: &AuthedClient,
        query: &Query,
    ) -> Result<ResultStream, SourceError> {
        let text = require_query_text(QUAKE, query.for_provider(QUAKE))?;
        tracing::trace!(provider = QUAKE, query = text, "search grammar");

        let limit = query.limit();
        let page_size = standard_page_size(limit);
        let (tx, stream) = result_channel(page_size);
        let request = PageRequest {
            client: client.clone(),
            endpoint: self.config.endpoint(SEARCH_PATH),
            query: text.to_owned(),
            page_size,
        };
        tokio::spawn(paginate(request, limit, tx));
        Ok(stream)
    }

    fn translate(&self, generic: &str) -> Result<String, SourceError> {
        to_quake_grammar(generic)
    }
}

struct PageRequest {
    client: AuthedClient,
    endpoint: String,
    query: String,
    page_size: usize,
}

impl PageRequest {
    async fn fetch(&self, start: usize) -> Result<QuakeEnvelope<Vec<QuakeAsset>>, SourceError> {
        let (from, to) = last_year_window();
        let body = QuakeSearchRequest {
            query: &self.query,
            start,
            size: self.page_size,
            ignore_cache: false,
            start_time: format!("{} 00:00:00", from.format("%Y-%m-%d")),
            end_time: format!("{} 00:00:00", to.format("%Y-%m-%d")),
        };
        let page: QuakeEnvelope<Vec<QuakeAsset>> = self
            .client
            .http()
            .post(&self.endpoint)
            .header(TOKEN_HEADER, self.client.secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::Http(format!("Quake request failed: {e}")))?
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Quake response decode failed: {e}")))?;

        if !page.is_successful() {
            return Err(SourceError::Http(format!(
                "Quake search rejected: {}",
                page.message
            )));
        }
        Ok(page)
    }
}

/// Walk result offsets until the count is met or Quake runs dry.
async fn paginate(request: PageRequest, limit: QueryLimit, tx: mpsc::Sender<SearchResult>) {
    if limit == QueryLimit::Limited(0) {
        return;
    }
    let mut found = 0usize;

    loop {
        let page = match request.fetch(found).await {
            Ok(page) => page,
            Err(err) => {
                tracing::error!(provider = QUAKE, error = %err, "search error");
                break;
            }
        };
        let assets = page.data.unwrap_or_default();
        if assets.is_empty() {
            break;
        }

        found += assets.len();
        for asset in assets {
            if tx.send(asset_to_result(asset)).await.is_err() {
                tracing::debug!(provider = QUAKE, "result consumer dropped, stopping");
                return;
            }
        }

        let pagination = &page.meta.pagination;
        let past_total = pagination.count > 0 && found as u64 > pagination.total;
        if limit.is_satisfied_by(found) || past_total {
            break;
        }
    }

    tracing::info!(provider = QUAKE, found, "search done");
}

fn asset_to_result(asset: QuakeAsset) -> SearchResult {
    let QuakeAsset {
        ip,
        port,
        hostname,
        domain,
        service,
    } = asset;

    let mut url = match service.http.http_load_url.as_slice() {
        [only] => only.clone(),
        _ => String::new(),
    };
    if url.is_empty() {
        let target = if domain.is_empty() { &hostname } else { &domain };
        if !target.is_empty() {
            url = format!("http://{target}:{port}");
        }
    }
    let licence = service.http.icp.map(|icp| icp.main_licence).unwrap_or_default();

    SearchResult {
        ip,
        url,
        host: hostname,
        domain,
        port,
        icp_unit: licence.unit,
        icp_licence: licence.licence,
    }
}

/// Translate a generic query into Quake grammar.
///
/// Clauses joined by `&&` become `keyword: value` clauses joined by ` AND `.
/// A `not ` prefix wraps the clause as `(NOT ...)`, except `not domain:""`
/// which becomes `is_domain: true`.
///
/// # Errors
///
/// Returns [`SourceError::Grammar`] for unsupported keywords or clauses
/// without a `:` delimiter.
pub fn to_quake_grammar(query: &str) -> Result<String, SourceError> {
    let clauses = generic_clauses(query)
        .map(quake_clause)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(clauses.join(" AND "))
}

fn quake_clause(clause: &str) -> Result<String, SourceError> {
    let parsed = parse_generic_clause(clause, QUAKE)?;
    let field = match parsed.keyword {
        "domain" if parsed.negated && parsed.value == r#""""# => {
            return Ok("is_domain: true".into());
        }
        "ip" => "ip",
        "domain" => "domain",
        "header" => "headers",
        "favicon" => "favicon",
        "cert" => "cert",
        "title" => "title",
        "body" => "body",
        _ => {
            return Err(SourceError::Grammar(format!(
                "transfer to QUAKE grammar false: unsupported keyword {:?}",
                parsed.keyword
            )))
        }
    };
    let translated = format!("{field}: {}", parsed.value);
    if parsed.negated {
        Ok(format!("(NOT {translated})"))
    } else {
        Ok(translated)
    }
}
