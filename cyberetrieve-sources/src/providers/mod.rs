//! Provider implementations.
//!
//! Each module provides a struct implementing [`crate::provider::Provider`]
//! for one remote API, plus the translator from the generic query syntax
//! into that provider's grammar.

pub mod fofa;
pub mod hunter;
pub mod quake;

pub use fofa::FofaProvider;
pub use hunter::HunterProvider;
pub use quake::QuakeProvider;

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Deserializer};

use crate::error::SourceError;
use crate::types::QueryLimit;

/// Page size used when the requested count is at least this large.
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Largest page size any provider is asked for.
pub const DEFAULT_PAGE_SIZE_MAX: usize = 100;

/// Page size shared by FOFA and Quake: the default page, shrunk to the
/// requested count when smaller, and the maximum page when unlimited.
pub(crate) fn standard_page_size(limit: QueryLimit) -> usize {
    match limit {
        QueryLimit::Unlimited => DEFAULT_PAGE_SIZE_MAX,
        QueryLimit::Limited(n) => n.min(DEFAULT_PAGE_SIZE),
    }
}

/// First and last day of the one-year search window ending today.
pub(crate) fn last_year_window() -> (NaiveDate, NaiveDate) {
    let today = Local::now().date_naive();
    let start = today
        .with_year(today.year() - 1)
        .unwrap_or_else(|| today - Duration::days(365));
    (start, today)
}

/// One generic `keyword:value` clause, split apart.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct GenericClause<'a> {
    pub negated: bool,
    pub keyword: &'a str,
    pub value: &'a str,
}

/// Split a generic clause such as `not title:"admin"`.
///
/// A case-insensitive `not ` prefix marks the clause as negated. The
/// keyword ends at the first `:`; everything after it is the value.
pub(crate) fn parse_generic_clause<'a>(
    clause: &'a str,
    grammar: &str,
) -> Result<GenericClause<'a>, SourceError> {
    let (negated, rest) = match clause.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("not ") => (true, &clause[4..]),
        _ => (false, clause),
    };
    let (keyword, value) = rest.split_once(':').ok_or_else(|| {
        SourceError::Grammar(format!(
            "transfer to {grammar} grammar false: {clause:?} is not keyword:value"
        ))
    })?;
    Ok(GenericClause {
        negated,
        keyword: keyword.trim(),
        value: value.trim(),
    })
}

/// Split a generic query on `&&` into trimmed clauses.
pub(crate) fn generic_clauses(query: &str) -> impl Iterator<Item = &str> {
    query.split("&&").map(str::trim)
}

/// Decode a field that providers send as `null` when empty.
///
/// Use together with `#[serde(default)]` so a missing field decodes too.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "null_as_default")]
        name: String,
        #[serde(default, deserialize_with = "null_as_default")]
        port: u16,
    }

    #[test]
    fn null_and_missing_fields_decode_as_default() {
        let row: Row = serde_json::from_str(r#"{"name":null,"port":null}"#).expect("decode");
        assert!(row.name.is_empty());
        assert_eq!(row.port, 0);

        let row: Row = serde_json::from_str("{}").expect("decode");
        assert!(row.name.is_empty());

        let row: Row = serde_json::from_str(r#"{"name":"x","port":80}"#).expect("decode");
        assert_eq!(row.name, "x");
        assert_eq!(row.port, 80);
    }

    #[test]
    fn standard_page_size_rules() {
        assert_eq!(standard_page_size(QueryLimit::Limited(5)), 5);
        assert_eq!(standard_page_size(QueryLimit::Limited(30)), 30);
        assert_eq!(standard_page_size(QueryLimit::Limited(500)), 30);
        assert_eq!(standard_page_size(QueryLimit::Unlimited), 100);
    }

    #[test]
    fn window_spans_one_year() {
        let (start, end) = last_year_window();
        assert!(start < end);
        assert_eq!(end.year() - start.year(), 1);
    }

    #[test]
    fn parse_plain_clause() {
        let clause = parse_generic_clause(r#"title:"login""#, "FOFA").expect("should parse");
        assert_eq!(
            clause,
            GenericClause {
                negated: false,
                keyword: "title",
                value: r#""login""#,
            }
        );
    }

    #[test]
    fn parse_negated_clause_case_insensitive() {
        let clause = parse_generic_clause(r#"NOT domain:"""#, "QUAKE").expect("should parse");
        assert!(clause.negated);
        assert_eq!(clause.keyword, "domain");
        assert_eq!(clause.value, r#""""#);
    }

    #[test]
    fn parse_keeps_colons_in_value() {
        let clause =
            parse_generic_clause(r#"header:"Server: nginx""#, "FOFA").expect("should parse");
        assert_eq!(clause.value, r#""Server: nginx""#);
    }

    #[test]
    fn parse_without_delimiter_fails() {
        let err = parse_generic_clause("login", "HUNTER").unwrap_err();
        assert!(err.to_string().contains("HUNTER"));
    }

    #[test]
    fn clauses_split_on_and() {
        let clauses: Vec<&str> = generic_clauses(r#"title:"a" && body:"b""#).collect();
        assert_eq!(clauses, vec![r#"title:"a""#, r#"body:"b""#]);
    }
}
