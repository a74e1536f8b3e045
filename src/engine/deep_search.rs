//! Deep search: widen a `domain` clause with a certificate clause.
//!
//! `domain:"example.com"` becomes `domain:"example.com" OR cert:"example.com"`
//! in the generic grammar, and the equivalent `||`/`=` form for providers
//! that spell clauses that way. Only the first delimited segment is used, so
//! a query holding more than one clause is widened by its first value only.

use std::sync::Arc;

use cyberetrieve_sources::{ClauseSyntax, Provider, Query, UNLIMITED};

/// Widen `query` with a cert clause if it mentions `domain`.
///
/// Returns `None` when the query has no domain clause or the value after
/// the first delimiter is too short to hold a quoted domain.
pub fn widen_domain_clause(query: &str, syntax: ClauseSyntax) -> Option<String> {
    if !query.contains("domain") {
        return None;
    }
    let segment = query.split(syntax.delimiter).nth(1)?;
    let mut chars = segment.chars();
    chars.next()?;
    chars.next_back()?;
    let domain = chars.as_str();
    Some(syntax.or_cert(query, domain))
}

/// Rewrite the generic query and every selected provider's override, and
/// lift the count cap.
pub(crate) fn apply(query: &mut Query, providers: &[Arc<dyn Provider>]) {
    match widen_domain_clause(&query.query, ClauseSyntax::GENERIC) {
        Some(widened) => query.query = widened,
        None => tracing::debug!("deep search: generic query has no usable domain clause"),
    }

    for provider in providers {
        let name = provider.name();
        let Some(current) = query.override_for(name) else {
            continue;
        };
        match widen_domain_clause(current, provider.clause_syntax()) {
            Some(widened) => {
                query.overrides.insert(name.to_owned(), widened);
            }
            None => {
                tracing::debug!(provider = name, "deep search: override has no usable domain clause")
            }
        }
    }

    query.number_of_query = UNLIMITED;
}
