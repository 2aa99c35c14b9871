//! Name matching used when looking records up by what a user typed.

use infra::documents::Named;
use infra::persistence::NameQuery;

/// Whether `query` appears anywhere in `name`, ignoring case. The query is
/// plain text, not a pattern.
pub fn contains_ignoring_case(name: &str, query: &str) -> bool {
    name.to_lowercase().contains(&query.to_lowercase())
}

pub fn eq_ignoring_case(name: &str, query: &str) -> bool {
    name.to_lowercase() == query.to_lowercase()
}

pub fn matches(query: &NameQuery, name: &str) -> bool {
    match query {
        NameQuery::Containing(q) => contains_ignoring_case(name, q),
        NameQuery::Exactly(q) => eq_ignoring_case(name, q),
    }
}

/// Records whose name contains `query`; everything when there is no query.
/// Keeps the order records were given in.
pub fn search<D: Named>(records: Vec<D>, query: Option<&str>) -> Vec<D> {
    match query.filter(|q| !q.is_empty()) {
        None => records,
        Some(q) => records
            .into_iter()
            .filter(|r| contains_ignoring_case(r.name(), q))
            .collect(),
    }
}

/// The first record named exactly `query`, ignoring case.
pub fn find_exact<D: Named>(records: Vec<D>, query: &str) -> Option<D> {
    records
        .into_iter()
        .find(|r| eq_ignoring_case(r.name(), query))
}
