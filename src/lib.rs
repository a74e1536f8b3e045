//! cyberetrieve: one deduplicated result stream across cyberspace-asset
//! search engines.
//!
//! A query is dispatched concurrently to every selected provider (FOFA,
//! 360 Quake, Qi-AnXin Hunter, or any custom [`Provider`]) and the results
//! are merged as they arrive.
//!
//! # Architecture
//!
//! - **Auth gate**: every provider validates its credential once per run;
//!   the run proceeds while at least one succeeds
//! - **Workers**: one task per authenticated provider, each paginating its
//!   own API and forwarding into a bounded merge channel
//! - **Merge stage**: drops duplicates, enforces the requested count, and
//!   publishes to both the live receiver and the accumulated collection
//! - **Deep search**: optionally widens `domain` clauses with a certificate
//!   clause and lifts the count cap
//!
//! Provider adapters and the shared data model live in
//! [`cyberetrieve_sources`].

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;

pub use config::{CliConfig, EngineConfig, EngineOption, channel_capacity};
pub use engine::{ResultReceiver, RetrieveEngine};
pub use error::{Result, RetrieveError};
pub use registry::{ProviderKind, ProviderRegistry, ProviderSelection};

pub use cyberetrieve_sources::{
    AuthedClient, ClauseSyntax, Provider, Query, QueryLimit, ResultStream, SearchResult, Session,
    SourceError, UNLIMITED,
};
