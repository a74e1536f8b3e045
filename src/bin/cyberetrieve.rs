//! CLI binary for cyberetrieve.
//!
//! Prints one JSON object per distinct result on stdout; logs go to stderr.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cyberetrieve::{
    CliConfig, EngineOption, ProviderKind, ProviderSelection, Query, RetrieveEngine, SearchResult,
    Session,
};
use tracing_subscriber::EnvFilter;

/// Count used when neither the command line nor the config file sets one.
const DEFAULT_COUNT: i64 = 100;

/// Search FOFA, Quake and Hunter at once and print deduplicated results.
#[derive(Parser)]
#[command(name = "cyberetrieve", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Generic query, e.g. `domain:"example.com"`.
    #[arg(short, long)]
    query: Option<String>,

    /// Provider-specific query, as `PROVIDER=QUERY` (e.g. `FOFA=title="x"`).
    #[arg(long = "override", value_name = "PROVIDER=QUERY")]
    overrides: Vec<String>,

    /// Number of distinct results to fetch; -1 for no limit.
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    count: Option<i64>,

    /// Search 360 Quake.
    #[arg(long)]
    quake: bool,

    /// Search FOFA.
    #[arg(long)]
    fofa: bool,

    /// Search Qi-AnXin Hunter.
    #[arg(long)]
    hunter: bool,

    /// Translate the generic query into each provider's grammar.
    #[arg(long)]
    auto_grammar: bool,

    /// Add a certificate clause to domain queries and lift the count cap.
    #[arg(long)]
    deep: bool,

    /// Print results as they arrive instead of after the run.
    #[arg(long)]
    stream: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs on stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("cyberetrieve=info,cyberetrieve_sources=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => CliConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CliConfig::default(),
    };

    let session = session_with_env(file.session.clone());
    let query = build_query(&cli, file.query.clone())?;
    let mut options = file.options(cli_selection(&cli))?;
    options.extend(cli_flags(&cli));

    let mut engine = RetrieveEngine::new(query, session, options)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut printed = 0usize;
    if cli.stream {
        let mut receiver = engine.retrieve_stream().await?;
        while let Some(result) = receiver.recv().await {
            print_result(&mut out, &result)?;
            printed += 1;
        }
    } else {
        for result in engine.retrieve().await? {
            print_result(&mut out, &result)?;
            printed += 1;
        }
    }
    out.flush()?;

    tracing::info!(results = printed, "finished");
    Ok(())
}

/// Fill credentials missing from the file from the environment.
fn session_with_env(mut session: Session) -> Session {
    let fill = |slot: &mut String, var: &str| {
        if slot.is_empty() {
            if let Ok(value) = std::env::var(var) {
                *slot = value;
            }
        }
    };
    fill(&mut session.quake_token, "CYBERETRIEVE_QUAKE_TOKEN");
    fill(&mut session.fofa_key, "CYBERETRIEVE_FOFA_KEY");
    fill(&mut session.hunter_key, "CYBERETRIEVE_HUNTER_KEY");
    session
}

fn build_query(cli: &Cli, from_file: Option<Query>) -> anyhow::Result<Query> {
    let mut query = match (&cli.query, from_file) {
        (Some(text), _) => Query::new(text.clone(), DEFAULT_COUNT),
        (None, Some(query)) => query,
        (None, None) => anyhow::bail!("no query given: pass --query or set [query] in the config"),
    };
    if let Some(count) = cli.count {
        query.number_of_query = count;
    }
    for raw in &cli.overrides {
        let (provider, text) = raw
            .split_once('=')
            .with_context(|| format!("override {raw:?} is not PROVIDER=QUERY"))?;
        query
            .overrides
            .insert(provider.trim().to_uppercase(), text.to_owned());
    }
    Ok(query)
}

/// Providers selected by flag; merged with the file's list so endpoint
/// overrides apply either way.
fn cli_selection(cli: &Cli) -> ProviderSelection {
    [
        (cli.quake, ProviderKind::Quake),
        (cli.fofa, ProviderKind::Fofa),
        (cli.hunter, ProviderKind::Hunter),
    ]
    .into_iter()
    .filter_map(|(on, kind)| on.then_some(kind))
    .collect()
}

fn cli_flags(cli: &Cli) -> Vec<EngineOption> {
    [
        (cli.auto_grammar, EngineOption::AutoGrammar),
        (cli.deep, EngineOption::DeepSearch),
    ]
    .into_iter()
    .filter_map(|(on, option)| on.then_some(option))
    .collect()
}

fn print_result(out: &mut impl Write, result: &SearchResult) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, result)?;
    writeln!(out)?;
    Ok(())
}
