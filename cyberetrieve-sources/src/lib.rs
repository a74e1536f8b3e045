//! # cyberetrieve-sources
//!
//! Adapters for cyberspace-asset search engines and the data model they
//! share with the retrieval engine.
//!
//! ## Design
//!
//! - One [`Provider`] implementation per remote API: FOFA, Quake, Hunter
//! - Authentication returns an [`AuthedClient`] that is carried into every
//!   search call instead of being stored globally
//! - Searches return a [`ResultStream`] fed by a background pagination task
//! - Each provider translates the generic `keyword:value` syntax into its
//!   own grammar
//!
//! ## Security
//!
//! - Credentials never appear in `Debug` output or error messages
//! - Query text is logged only at trace level

pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod providers;
pub mod types;

pub use config::ProviderConfig;
pub use error::{Result, SourceError};
pub use http::AuthedClient;
pub use provider::{result_channel, ClauseSyntax, Provider, ResultStream};
pub use providers::{FofaProvider, HunterProvider, QuakeProvider};
pub use types::{Query, QueryLimit, SearchResult, Session, UNLIMITED};
