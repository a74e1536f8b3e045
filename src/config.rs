//! Engine options and file configuration.
//!
//! [`EngineOption`] values are applied in order to build an
//! [`EngineConfig`]. [`CliConfig`] is the TOML file the `cyberetrieve`
//! binary reads; it turns into the same options.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use cyberetrieve_sources::providers::DEFAULT_PAGE_SIZE_MAX;
use cyberetrieve_sources::{Provider, ProviderConfig, Query, Session, UNLIMITED};
use serde::Deserialize;

use crate::error::{Result, RetrieveError};
use crate::registry::{ProviderKind, ProviderSelection};

/// A single construction option for [`RetrieveEngine`](crate::RetrieveEngine).
#[derive(Clone)]
pub enum EngineOption {
    /// Select the Quake adapter.
    Quake,
    /// Select the FOFA adapter.
    Fofa,
    /// Select the Hunter adapter.
    Hunter,
    /// Translate the generic query into each provider grammar when the
    /// provider has no override of its own.
    AutoGrammar,
    /// Widen `domain` clauses with a certificate clause and lift the count cap.
    DeepSearch,
    /// Register a custom adapter. Replaces any provider with the same name.
    Provider(Arc<dyn Provider>),
}

impl From<ProviderKind> for EngineOption {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Quake => Self::Quake,
            ProviderKind::Fofa => Self::Fofa,
            ProviderKind::Hunter => Self::Hunter,
        }
    }
}

impl fmt::Debug for EngineOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quake => f.write_str("Quake"),
            Self::Fofa => f.write_str("Fofa"),
            Self::Hunter => f.write_str("Hunter"),
            Self::AutoGrammar => f.write_str("AutoGrammar"),
            Self::DeepSearch => f.write_str("DeepSearch"),
            Self::Provider(p) => f.debug_tuple("Provider").field(&p.name()).finish(),
        }
    }
}

/// Resolved engine settings.
#[derive(Clone, Default)]
pub struct EngineConfig {
    /// Selected built-in providers.
    pub selection: ProviderSelection,
    /// Auto-grammar translation.
    pub auto_grammar: bool,
    /// Deep-search rewrite.
    pub deep_search: bool,
    /// Custom adapters, at most one per name, in registration order.
    pub custom: Vec<Arc<dyn Provider>>,
}

impl EngineConfig {
    /// Apply options in order.
    pub fn from_options(options: impl IntoIterator<Item = EngineOption>) -> Self {
        let mut config = Self::default();
        for option in options {
            config.apply(option);
        }
        config
    }

    /// Apply one option.
    pub fn apply(&mut self, option: EngineOption) {
        match option {
            EngineOption::Quake => self.selection.insert(ProviderKind::Quake),
            EngineOption::Fofa => self.selection.insert(ProviderKind::Fofa),
            EngineOption::Hunter => self.selection.insert(ProviderKind::Hunter),
            EngineOption::AutoGrammar => self.auto_grammar = true,
            EngineOption::DeepSearch => self.deep_search = true,
            EngineOption::Provider(provider) => {
                self.custom.retain(|p| p.name() != provider.name());
                self.custom.push(provider);
            }
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("selection", &self.selection)
            .field("auto_grammar", &self.auto_grammar)
            .field("deep_search", &self.deep_search)
            .field(
                "custom",
                &self.custom.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Capacity of the merge and live-result channels for a requested count.
///
/// Large counts get a fraction of the count so memory stays bounded;
/// unlimited queries use the largest provider page.
pub fn channel_capacity(number_of_query: i64) -> usize {
    if number_of_query == UNLIMITED {
        return DEFAULT_PAGE_SIZE_MAX;
    }
    let count = usize::try_from(number_of_query).unwrap_or(0);
    let capacity = if count > 1000 {
        count / 50
    } else if count > 3 && count < 500 {
        count / 3
    } else {
        count
    };
    capacity.max(1)
}

/// Connection override for one built-in provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// API host, e.g. a local mirror.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout_seconds: Option<u64>,
    /// User-Agent header.
    pub user_agent: Option<String>,
}

impl EndpointConfig {
    /// Overlay this override on the provider defaults.
    fn provider_config(&self, kind: ProviderKind) -> ProviderConfig {
        let base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_owned());
        let mut config = ProviderConfig::new(base_url);
        if let Some(timeout) = self.timeout_seconds {
            config = config.with_timeout_seconds(timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        config
    }
}

/// Per-provider endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// `[endpoints.quake]`
    pub quake: Option<EndpointConfig>,
    /// `[endpoints.fofa]`
    pub fofa: Option<EndpointConfig>,
    /// `[endpoints.hunter]`
    pub hunter: Option<EndpointConfig>,
}

impl Endpoints {
    fn get(&self, kind: ProviderKind) -> Option<&EndpointConfig> {
        match kind {
            ProviderKind::Quake => self.quake.as_ref(),
            ProviderKind::Fofa => self.fofa.as_ref(),
            ProviderKind::Hunter => self.hunter.as_ref(),
        }
    }
}

/// File configuration for the `cyberetrieve` binary.
///
/// ```toml
/// providers = ["fofa", "quake"]
/// auto_grammar = true
///
/// [session]
/// fofa_key = "..."
/// quake_token = "..."
///
/// [query]
/// query = 'domain:"example.com"'
/// number_of_query = 50
///
/// [endpoints.fofa]
/// timeout_seconds = 20
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Provider credentials.
    pub session: Session,
    /// Query to run when none is given on the command line.
    pub query: Option<Query>,
    /// Built-in providers to select.
    pub providers: Vec<ProviderKind>,
    /// Enable auto-grammar.
    pub auto_grammar: bool,
    /// Enable deep search.
    pub deep_search: bool,
    /// Connection overrides.
    pub endpoints: Endpoints,
}

impl CliConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieveError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetrieveError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieveError::Config`] on malformed TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RetrieveError::Config(e.to_string()))
    }

    /// Engine options described by this file, with `selected` providers
    /// from the command line added to the file's own list.
    ///
    /// Every selected provider with an endpoint override is registered as a
    /// custom adapter under its built-in name, so it takes the built-in's
    /// slot whichever way it was selected.
    ///
    /// # Errors
    ///
    /// Returns [`RetrieveError::Source`] if an endpoint override is invalid.
    pub fn options(&self, selected: ProviderSelection) -> Result<Vec<EngineOption>> {
        let mut selection = selected;
        for &kind in &self.providers {
            selection.insert(kind);
        }

        let mut options = Vec::new();
        for kind in selection.kinds() {
            options.push(EngineOption::from(kind));
            if let Some(endpoint) = self.endpoints.get(kind) {
                let config = endpoint.provider_config(kind);
                config.validate()?;
                tracing::debug!(provider = %kind, base_url = %config.base_url, "endpoint override");
                options.push(EngineOption::Provider(kind.instantiate(config)));
            }
        }
        if self.auto_grammar {
            options.push(EngineOption::AutoGrammar);
        }
        if self.deep_search {
            options.push(EngineOption::DeepSearch);
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_heuristic() {
        assert_eq!(channel_capacity(UNLIMITED), 100);
        assert_eq!(channel_capacity(0), 1);
        assert_eq!(channel_capacity(1), 1);
        assert_eq!(channel_capacity(3), 3);
        assert_eq!(channel_capacity(4), 1);
        assert_eq!(channel_capacity(30), 10);
        assert_eq!(channel_capacity(499), 166);
        assert_eq!(channel_capacity(500), 500);
        assert_eq!(channel_capacity(1000), 1000);
        assert_eq!(channel_capacity(5000), 100);
    }

    #[test]
    fn options_apply_in_order() {
        let config = EngineConfig::from_options([
            EngineOption::Fofa,
            EngineOption::Fofa,
            EngineOption::AutoGrammar,
        ]);
        assert_eq!(config.selection.bits(), 0x40);
        assert!(config.auto_grammar);
        assert!(!config.deep_search);
        assert!(config.custom.is_empty());
    }

    #[test]
    fn custom_provider_reregistered_keeps_latest() {
        let first = ProviderKind::Fofa.instantiate_default();
        let second = ProviderKind::Fofa.instantiate_default();
        let config = EngineConfig::from_options([
            EngineOption::Provider(first),
            EngineOption::Provider(Arc::clone(&second)),
        ]);
        assert_eq!(config.custom.len(), 1);
        assert!(Arc::ptr_eq(&config.custom[0], &second));
    }

    #[test]
    fn option_debug_names_custom_provider() {
        let option = EngineOption::Provider(ProviderKind::Hunter.instantiate_default());
        assert_eq!(format!("{option:?}"), r#"Provider("HUNTER")"#);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = CliConfig::from_file(Path::new("/nonexistent/path/cyberetrieve.toml"));
        assert!(matches!(result, Err(RetrieveError::Config(_))));
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").expect("write");
        assert!(matches!(
            CliConfig::from_file(&path),
            Err(RetrieveError::Config(_))
        ));
    }

    #[test]
    fn from_file_full_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cyberetrieve.toml");
        std::fs::write(
            &path,
            r#"
providers = ["fofa", "quake"]
auto_grammar = true

[session]
fofa_key = "f-key"
quake_token = "q-token"

[query]
query = 'domain:"example.com"'
number_of_query = 50

[query.overrides]
FOFA = 'domain="example.com"'

[endpoints.fofa]
base_url = "http://127.0.0.1:9999"
timeout_seconds = 3
"#,
        )
        .expect("write");

        let config = CliConfig::from_file(&path).expect("should parse");
        assert_eq!(config.session.fofa_key, "f-key");
        assert!(config.session.hunter_key.is_empty());
        let query = config.query.as_ref().expect("query table");
        assert_eq!(query.number_of_query, 50);
        assert_eq!(query.for_provider("FOFA"), r#"domain="example.com""#);
        assert_eq!(config.providers, vec![ProviderKind::Fofa, ProviderKind::Quake]);

        let options = config
            .options(ProviderSelection::default())
            .expect("valid endpoints");
        let names: Vec<String> = options.iter().map(|o| format!("{o:?}")).collect();
        assert_eq!(
            names,
            vec!["Quake", "Fofa", r#"Provider("FOFA")"#, "AutoGrammar"]
        );
    }

    #[test]
    fn empty_file_is_default() {
        let config = CliConfig::from_toml("").expect("empty toml");
        assert!(config.providers.is_empty());
        assert!(config.query.is_none());
        assert!(
            config
                .options(ProviderSelection::default())
                .expect("no endpoints")
                .is_empty()
        );
    }

    #[test]
    fn invalid_endpoint_is_source_error() {
        let config = CliConfig::from_toml(
            r#"
providers = ["hunter"]

[endpoints.hunter]
base_url = "ftp://mirror"
"#,
        )
        .expect("parse");
        assert!(matches!(
            config.options(ProviderSelection::default()),
            Err(RetrieveError::Source(_))
        ));
    }

    #[test]
    fn endpoint_applies_to_provider_selected_on_command_line() {
        let config = CliConfig::from_toml(
            r#"
[endpoints.fofa]
base_url = "http://127.0.0.1:9"
"#,
        )
        .expect("parse");
        let selected: ProviderSelection = [ProviderKind::Fofa].into_iter().collect();

        let options = config.options(selected).expect("valid endpoint");
        let names: Vec<String> = options.iter().map(|o| format!("{o:?}")).collect();
        assert_eq!(names, vec!["Fofa", r#"Provider("FOFA")"#]);

        let engine = EngineConfig::from_options(options);
        assert_eq!(engine.custom.len(), 1);
        assert_eq!(engine.custom[0].name(), "FOFA");
    }

    #[test]
    fn endpoint_for_unselected_provider_is_ignored() {
        let config = CliConfig::from_toml(
            r#"
[endpoints.hunter]
base_url = "http://127.0.0.1:9"
"#,
        )
        .expect("parse");
        let selected: ProviderSelection = [ProviderKind::Quake].into_iter().collect();
        let options = config.options(selected).expect("valid endpoint");
        let names: Vec<String> = options.iter().map(|o| format!("{o:?}")).collect();
        assert_eq!(names, vec!["Quake"]);
    }
}
