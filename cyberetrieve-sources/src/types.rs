//! Core types shared by the engine and the provider adapters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Sentinel count meaning "as many results as the providers will return".
pub const UNLIMITED: i64 = -1;

/// A single normalised asset record returned by a provider.
///
/// Two results are duplicates iff every field is equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchResult {
    /// IP address of the asset.
    pub ip: String,
    /// Reachable URL of the asset.
    pub url: String,
    /// Host (name or `ip:port`) as reported by the provider.
    pub host: String,
    /// Domain bound to the asset, if any.
    pub domain: String,
    /// Service port.
    pub port: u16,
    /// ICP registration unit, e.g. the registered company name.
    pub icp_unit: String,
    /// ICP licence number, e.g. `京ICP证030173号`.
    pub icp_licence: String,
}

/// How many results a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLimit {
    /// Stop after this many results.
    Limited(usize),
    /// Keep paginating until the provider runs dry.
    Unlimited,
}

impl QueryLimit {
    /// Interpret a raw requested count. `-1` is unlimited; any other
    /// negative value is invalid and yields `None`.
    pub fn from_count(count: i64) -> Option<Self> {
        match count {
            UNLIMITED => Some(Self::Unlimited),
            n if n >= 0 => Some(Self::Limited(usize::try_from(n).unwrap_or(usize::MAX))),
            _ => None,
        }
    }

    /// Returns the cap, or `None` when unlimited.
    pub fn cap(self) -> Option<usize> {
        match self {
            Self::Limited(n) => Some(n),
            Self::Unlimited => None,
        }
    }

    /// Whether `found` results satisfy this limit.
    pub fn is_satisfied_by(self, found: usize) -> bool {
        matches!(self, Self::Limited(n) if found >= n)
    }
}

/// A search query: the generic `keyword:value` form, optional
/// provider-specific overrides, and the requested result count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Generic query, e.g. `title:"login"`.
    pub query: String,
    /// Provider grammar overrides keyed by provider name (`"FOFA"`, ...).
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    /// Requested number of results; [`UNLIMITED`] for no cap.
    pub number_of_query: i64,
}

impl Query {
    /// Create a query with a generic query string and a requested count.
    pub fn new(query: impl Into<String>, number_of_query: i64) -> Self {
        Self {
            query: query.into(),
            overrides: HashMap::new(),
            number_of_query,
        }
    }

    /// Attach a provider-specific query.
    pub fn with_override(mut self, provider: impl Into<String>, query: impl Into<String>) -> Self {
        self.overrides.insert(provider.into(), query.into());
        self
    }

    /// The provider override, if one is set and non-empty.
    pub fn override_for(&self, provider: &str) -> Option<&str> {
        self.overrides
            .get(provider)
            .map(String::as_str)
            .filter(|q| !q.is_empty())
    }

    /// The query text a provider should send: its override when present,
    /// otherwise the generic query.
    pub fn for_provider(&self, provider: &str) -> &str {
        self.override_for(provider).unwrap_or(&self.query)
    }

    /// The requested count as a [`QueryLimit`]. Invalid negative counts
    /// are treated as zero; the engine rejects them before any search.
    pub fn limit(&self) -> QueryLimit {
        QueryLimit::from_count(self.number_of_query).unwrap_or(QueryLimit::Limited(0))
    }
}

/// Per-provider credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Quake `X-QuakeToken`.
    #[serde(default)]
    pub quake_token: String,
    /// FOFA API key.
    #[serde(default)]
    pub fofa_key: String,
    /// Hunter API key.
    #[serde(default)]
    pub hunter_key: String,
    /// Credentials for additional providers, keyed by provider name.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl Session {
    /// Credential registered for a custom provider.
    pub fn credential(&self, provider: &str) -> Option<&str> {
        self.extra
            .get(provider)
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(secret: &str) -> &'static str {
            if secret.is_empty() {
                "<unset>"
            } else {
                "<redacted>"
            }
        }
        f.debug_struct("Session")
            .field("quake_token", &mask(&self.quake_token))
            .field("fofa_key", &mask(&self.fofa_key))
            .field("hunter_key", &mask(&self.hunter_key))
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}
