use std::cmp::Ordering;

use crate::catalog::CatalogSnapshot;
use crate::config::MatcherConfig;
use crate::models::MatchCandidate;
use crate::normalize;

/// Ranks catalog candidates in `category` against one search term.
///
/// An empty term returns the cheapest searchable records unscored; an
/// unknown category or a term with no candidates returns an empty list,
/// never an error.
pub(crate) fn find(
    catalog: &CatalogSnapshot,
    config: &MatcherConfig,
    category: &str,
    term: &str,
) -> Vec<MatchCandidate> {
    let normalized_term = normalize::normalize(term);
    if normalized_term.is_empty() {
        return cheapest(catalog, config, category);
    }
    let tokens = normalize::tokenize(&normalized_term);

    let mut out = Vec::new();
    for record in catalog.category_records(category) {
        if !record.is_searchable() {
            continue;
        }
        let description = record.base_description.as_str();
        let code = record.code.to_lowercase();

        let code_matched = code.contains(&normalized_term)
            || tokens.iter().any(|token| code.contains(token.as_str()));
        let description_matched = description.contains(&normalized_term)
            || tokens.iter().any(|token| description.contains(token.as_str()));
        if !code_matched && !description_matched {
            continue;
        }

        let score = score_match(config, description, &normalized_term, &tokens);
        if score == 0 && !code_matched {
            continue;
        }
        out.push(MatchCandidate {
            record: record.clone(),
            score,
            term: normalized_term.clone(),
        });
    }

    out.sort_by(candidate_ordering);
    out.truncate(config.max_results);
    out
}

/// Additive integer score of one description against one term. Weights
/// come from `MatcherConfig`; the defaults reward exact phrases, then
/// ordered token coverage, then per-token hits, with a precision bonus
/// for short specific descriptions.
pub(crate) fn score_match(
    config: &MatcherConfig,
    description: &str,
    term: &str,
    tokens: &[String],
) -> i64 {
    if description.is_empty() || term.is_empty() {
        return 0;
    }

    let mut score = 0;
    if description.contains(term) {
        score += config.exact_phrase_weight;
    }

    let mut positions = Vec::with_capacity(tokens.len());
    let mut all_present = !tokens.is_empty();
    for token in tokens {
        match description.find(token.as_str()) {
            Some(position) => positions.push(position),
            None => all_present = false,
        }
    }
    if all_present {
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        score += if positions == sorted {
            config.ordered_tokens_weight
        } else {
            config.unordered_tokens_weight
        };
    }

    for token in tokens {
        if let Some(position) = description.find(token.as_str()) {
            score += if starts_at_word_boundary(description, position) {
                config.boundary_token_weight
            } else {
                config.midword_token_weight
            };
        }
    }

    let description_words = description.split_whitespace().count();
    let term_words = term.split_whitespace().count();
    if description_words <= term_words + 2 {
        score += config.precision_bonus;
    }

    score
}

fn starts_at_word_boundary(text: &str, index: usize) -> bool {
    index == 0
        || text[..index]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
}

fn cheapest(
    catalog: &CatalogSnapshot,
    config: &MatcherConfig,
    category: &str,
) -> Vec<MatchCandidate> {
    let mut out: Vec<MatchCandidate> = catalog
        .category_records(category)
        .filter(|record| record.is_searchable())
        .map(|record| MatchCandidate {
            record: record.clone(),
            score: 0,
            term: String::new(),
        })
        .collect();
    out.sort_by(|a, b| {
        price_ordering(a, b).then_with(|| a.record.code.cmp(&b.record.code))
    });
    out.truncate(config.max_results);
    out
}

fn candidate_ordering(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| price_ordering(a, b))
        .then_with(|| a.record.code.cmp(&b.record.code))
}

fn price_ordering(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    a.record
        .base_price
        .partial_cmp(&b.record.base_price)
        .unwrap_or(Ordering::Equal)
}
