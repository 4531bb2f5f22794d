//! Composite scoring of search candidates against a library title.
//!
//! Lower scores are better. The title tier and the year penalty are added,
//! and the cheapest candidate wins (first one on ties).

use shudaika_api::traits::CanonicalMedia;

use crate::normalize::normalize;

/// Any title variant equals the query, ignoring case.
pub const TITLE_EXACT: u32 = 0;
/// Normalized title equals the normalized query.
pub const TITLE_NORMALIZED: u32 = 5;
/// One raw title contains the other.
pub const TITLE_CONTAINS: u32 = 10;
/// One normalized title contains the other.
pub const TITLE_NORMALIZED_CONTAINS: u32 = 15;
/// No usable title relation.
pub const TITLE_NO_MATCH: u32 = 50;

/// Cost per year of distance between requested and candidate year.
pub const YEAR_DISTANCE_COST: u32 = 100;
/// A year was requested but the candidate has none.
pub const YEAR_UNKNOWN: u32 = 50;

/// Score how well any of the candidate's titles matches the query.
pub fn score_title(candidate: &CanonicalMedia, query: &str) -> u32 {
    let variants: Vec<&str> = candidate.title.variants().collect();
    if variants.is_empty() {
        return TITLE_NO_MATCH;
    }

    let query_lower = query.trim().to_lowercase();
    if variants.iter().any(|v| v.trim().to_lowercase() == query_lower) {
        return TITLE_EXACT;
    }

    let query_norm = normalize(query);
    let normalized: Vec<String> = variants.iter().map(|v| normalize(v)).collect();
    if !query_norm.is_empty() && normalized.iter().any(|v| *v == query_norm) {
        return TITLE_NORMALIZED;
    }

    if !query_lower.is_empty()
        && variants.iter().any(|v| {
            let v = v.trim().to_lowercase();
            v.contains(&query_lower) || query_lower.contains(&v)
        })
    {
        return TITLE_CONTAINS;
    }

    if !query_norm.is_empty()
        && normalized
            .iter()
            .filter(|v| !v.is_empty())
            .any(|v| v.contains(&query_norm) || query_norm.contains(v.as_str()))
    {
        return TITLE_NORMALIZED_CONTAINS;
    }

    TITLE_NO_MATCH
}

/// Penalty for the distance between the requested year and the candidate's.
pub fn year_penalty(candidate: &CanonicalMedia, year: Option<i32>) -> u32 {
    match (year, candidate.start_year) {
        (None, _) => 0,
        (Some(_), None) => YEAR_UNKNOWN,
        (Some(wanted), Some(actual)) => {
            wanted.abs_diff(actual).saturating_mul(YEAR_DISTANCE_COST)
        }
    }
}

pub fn score_candidate(candidate: &CanonicalMedia, query: &str, year: Option<i32>) -> u32 {
    score_title(candidate, query).saturating_add(year_penalty(candidate, year))
}

/// The lowest-scoring candidate; ties keep the earliest.
pub fn best_candidate<'a>(
    candidates: &'a [CanonicalMedia],
    query: &str,
    year: Option<i32>,
) -> Option<(&'a CanonicalMedia, u32)> {
    candidates
        .iter()
        .map(|c| (c, score_candidate(c, query, year)))
        .fold(None, |best, (c, score)| match best {
            Some((_, best_score)) if best_score <= score => best,
            _ => Some((c, score)),
        })
}
