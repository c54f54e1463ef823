use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::catalog::{CatalogSnapshot, category_key};
use crate::graph::RelationshipGraph;
use crate::models::{MatchCandidate, RankedService, ResultOrigin, ServiceRecord};

/// Merges matcher output across every (term, category) batch.
///
/// Deduplicates by code keeping the first occurrence (upgrading its
/// recorded score when a later batch scored the same code higher), then
/// sorts by preferred category, query-token presence in the description,
/// and ascending base price. When `flatten_categories` is set the
/// category key is dropped, so cross-category results rank purely by
/// relevance and price.
pub(crate) fn aggregate(
    batches: Vec<Vec<MatchCandidate>>,
    query_tokens: &HashSet<String>,
    preferred_category: &str,
    flatten_categories: bool,
) -> Vec<MatchCandidate> {
    let mut out: Vec<MatchCandidate> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for candidate in batches.into_iter().flatten() {
        match seen.get(&candidate.record.code) {
            Some(position) => {
                if candidate.score > out[*position].score {
                    out[*position].score = candidate.score;
                }
            }
            None => {
                seen.insert(candidate.record.code.clone(), out.len());
                out.push(candidate);
            }
        }
    }

    let preferred = category_key(preferred_category);
    out.sort_by(|a, b| {
        let by_category = if flatten_categories {
            Ordering::Equal
        } else {
            category_rank(a, &preferred).cmp(&category_rank(b, &preferred))
        };
        by_category
            .then_with(|| token_rank(a, query_tokens).cmp(&token_rank(b, query_tokens)))
            .then_with(|| {
                a.record
                    .base_price
                    .partial_cmp(&b.record.base_price)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.record.code.cmp(&b.record.code))
    });
    out
}

fn category_rank(candidate: &MatchCandidate, preferred: &str) -> u8 {
    u8::from(category_key(&candidate.record.category) != preferred)
}

fn token_rank(candidate: &MatchCandidate, query_tokens: &HashSet<String>) -> u8 {
    let hit = query_tokens
        .iter()
        .any(|token| candidate.record.base_description.contains(token.as_str()));
    u8::from(!hit)
}

/// Resolves related suggestions for the primary result codes via the
/// graph and materializes them from the catalog. Primary codes are never
/// suggested back; output is capped and deterministic.
pub(crate) fn related_records(
    primary_codes: &[String],
    graph: &RelationshipGraph,
    catalog: &CatalogSnapshot,
    limit: usize,
) -> Vec<ServiceRecord> {
    if limit == 0 {
        return Vec::new();
    }
    let primaries: HashSet<&str> = primary_codes.iter().map(String::as_str).collect();

    let mut out = Vec::new();
    let mut seen = HashSet::<String>::new();
    for code in primary_codes {
        for related in graph.related_to(code, limit) {
            if primaries.contains(related.as_str()) || !seen.insert(related.clone()) {
                continue;
            }
            if let Some(record) = catalog.record_by_code(&related) {
                out.push(record.clone());
                if out.len() >= limit {
                    return out;
                }
            }
        }
    }
    out
}

/// Wraps aggregated candidates into primary result rows carrying their
/// tier price ranges.
pub(crate) fn primary_rows(
    catalog: &CatalogSnapshot,
    candidates: Vec<MatchCandidate>,
) -> Vec<RankedService> {
    candidates
        .into_iter()
        .map(|candidate| {
            let (min_price, max_price) = catalog.record_price_range(&candidate.record);
            RankedService {
                record: candidate.record,
                score: candidate.score,
                origin: ResultOrigin::Primary,
                min_price,
                max_price,
            }
        })
        .collect()
}

/// Wraps related suggestions into tagged rows; appended after the
/// primary rows and excluded from price totals.
pub(crate) fn related_rows(
    catalog: &CatalogSnapshot,
    records: Vec<ServiceRecord>,
) -> Vec<RankedService> {
    records
        .into_iter()
        .map(|record| {
            let (min_price, max_price) = catalog.record_price_range(&record);
            RankedService {
                record,
                score: 0,
                origin: ResultOrigin::Related,
                min_price,
                max_price,
            }
        })
        .collect()
}

/// Overall price range of the primary rows; related suggestions are
/// excluded from the totals.
pub(crate) fn price_totals(rows: &[RankedService]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for row in rows {
        if row.origin != ResultOrigin::Primary {
            continue;
        }
        min = min.min(row.min_price);
        max = max.max(row.max_price);
    }
    if min.is_finite() && max.is_finite() {
        (min, max)
    } else {
        (0.0, 0.0)
    }
}
