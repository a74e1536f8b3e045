//! Provider selection and the ordered set of adapters a run dispatches to.
//!
//! Built-in providers are picked with a [`ProviderSelection`] bitset; any
//! other [`Provider`] implementation can join the same set by name. The
//! gate and the pipeline only ever see the resolved list, so adding an
//! adapter never touches them.

use std::fmt;
use std::sync::Arc;

use cyberetrieve_sources::providers::{fofa, hunter, quake};
use cyberetrieve_sources::{FofaProvider, HunterProvider, Provider, ProviderConfig, QuakeProvider};
use serde::{Deserialize, Serialize};

/// A built-in provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// 360 Quake.
    Quake,
    /// FOFA.
    Fofa,
    /// Qi-AnXin Hunter.
    Hunter,
}

impl ProviderKind {
    /// All built-ins, in dispatch order.
    pub const ALL: [ProviderKind; 3] = [Self::Quake, Self::Fofa, Self::Hunter];

    /// Selection bit for this provider.
    pub const fn bit(self) -> u8 {
        match self {
            Self::Quake => 0x80,
            Self::Fofa => 0x40,
            Self::Hunter => 0x20,
        }
    }

    /// Provider name, also the override key in a query.
    pub fn name(self) -> &'static str {
        match self {
            Self::Quake => quake::QUAKE,
            Self::Fofa => fofa::FOFA,
            Self::Hunter => hunter::HUNTER,
        }
    }

    /// Public API host the adapter talks to by default.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Quake => quake::DEFAULT_BASE_URL,
            Self::Fofa => fofa::DEFAULT_BASE_URL,
            Self::Hunter => hunter::DEFAULT_BASE_URL,
        }
    }

    /// Build the adapter against the given connection settings.
    pub fn instantiate(self, config: ProviderConfig) -> Arc<dyn Provider> {
        match self {
            Self::Quake => Arc::new(QuakeProvider::new(config)),
            Self::Fofa => Arc::new(FofaProvider::new(config)),
            Self::Hunter => Arc::new(HunterProvider::new(config)),
        }
    }

    /// Build the adapter against its public API host.
    pub fn instantiate_default(self) -> Arc<dyn Provider> {
        self.instantiate(ProviderConfig::new(self.default_base_url()))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitset of selected built-in providers.
///
/// Inserting is a bitwise OR, so selecting the same provider twice is a
/// no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderSelection(u8);

impl ProviderSelection {
    /// Select a provider.
    pub fn insert(&mut self, kind: ProviderKind) {
        self.0 |= kind.bit();
    }

    /// Whether a provider is selected.
    pub fn contains(self, kind: ProviderKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether nothing is selected.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit pattern.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Selected providers in dispatch order.
    pub fn kinds(self) -> impl Iterator<Item = ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<ProviderKind> for ProviderSelection {
    fn from_iter<I: IntoIterator<Item = ProviderKind>>(iter: I) -> Self {
        let mut selection = Self::default();
        for kind in iter {
            selection.insert(kind);
        }
        selection
    }
}

/// Ordered, name-unique set of providers.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a selection plus custom adapters into one registry.
    ///
    /// Built-ins come first in [`ProviderKind::ALL`] order. A custom adapter
    /// whose name matches a built-in takes that built-in's slot; otherwise it
    /// is appended.
    pub fn resolve(selection: ProviderSelection, custom: &[Arc<dyn Provider>]) -> Self {
        let mut registry = Self::new();
        for kind in selection.kinds() {
            registry.register(kind.instantiate_default());
        }
        for provider in custom {
            registry.register(Arc::clone(provider));
        }
        registry
    }

    /// Add a provider, replacing any registered under the same name.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        match self
            .providers
            .iter_mut()
            .find(|existing| existing.name() == provider.name())
        {
            Some(slot) => {
                tracing::debug!(provider = provider.name(), "replacing registered provider");
                *slot = provider;
            }
            None => self.providers.push(provider),
        }
    }

    /// Look a provider up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Registered provider names, in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Consume the registry, yielding providers in dispatch order.
    pub fn into_providers(self) -> Vec<Arc<dyn Provider>> {
        self.providers
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
