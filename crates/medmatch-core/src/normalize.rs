use std::collections::HashSet;

use crate::models::Tier;

/// Applied in declaration order after lowercasing and whitespace
/// collapse, so multi-word entries must precede the single-word forms
/// they could otherwise collide with.
const SYNONYMS: &[(&str, &str)] = &[
    ("x ray", "x-ray"),
    ("xray", "x-ray"),
    ("ultra sound", "ultrasound"),
    ("cat-scan", "ct scan"),
    ("cat scan", "ct scan"),
    ("mri scan", "mri"),
    ("magnetic resonance", "mri"),
];

/// Tier suffixes as printed on the charge sheet. Longer suffixes first.
const TIER_SUFFIXES: &[(&str, Tier)] = &[
    ("-Nk", Tier::Nk),
    ("-NK", Tier::Nk),
    ("-K", Tier::K),
    ("-P", Tier::P),
];

/// Canonicalizes free text and stored descriptions: lowercase, collapsed
/// whitespace, synonym table. Pure and stable, so the output doubles as a
/// cache key.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    for (from, to) in SYNONYMS {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out
}

/// Splits a description into its base stem and pricing tier, trimming the
/// `-K` / `-Nk` / `-P` suffix when present.
#[must_use]
pub fn strip_tier_suffix(description: &str) -> (String, Tier) {
    let trimmed = description.trim();
    for (suffix, tier) in TIER_SUFFIXES {
        if let Some(stem) = trimmed.strip_suffix(suffix) {
            return (stem.trim_end().to_string(), *tier);
        }
    }
    (trimmed.to_string(), Tier::None)
}

/// Whitespace tokens of the normalized text, order-preserving and
/// de-duplicated. Hyphenated terms like `x-ray` stay whole.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::<String>::new();
    for token in normalize(text).split_whitespace() {
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
        }
    }
    out
}

/// Alphanumeric token set of the normalized text, used for Jaccard
/// similarity between queries (`x-ray` contributes `x` and `ray`).
#[must_use]
pub fn token_set(text: &str) -> HashSet<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{normalize, strip_tier_suffix, token_set, tokenize};
    use crate::models::Tier;

    #[test]
    fn normalize_lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("  Chest   X-Ray \n"), "chest x-ray");
    }

    #[test]
    fn normalize_applies_synonym_table() {
        assert_eq!(normalize("xray chest"), "x-ray chest");
        assert_eq!(normalize("Ultra Sound abdomen"), "ultrasound abdomen");
        assert_eq!(normalize("CAT scan brain"), "ct scan brain");
        assert_eq!(normalize("MRI scan knee"), "mri knee");
    }

    #[test]
    fn normalize_is_stable_under_repetition() {
        let once = normalize("XRay  chest");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn strip_tier_suffix_recognizes_all_tiers() {
        assert_eq!(
            strip_tier_suffix("Blood Test-K"),
            ("Blood Test".to_string(), Tier::K)
        );
        assert_eq!(
            strip_tier_suffix("Blood Test-Nk"),
            ("Blood Test".to_string(), Tier::Nk)
        );
        assert_eq!(
            strip_tier_suffix("WARD BED-NK"),
            ("WARD BED".to_string(), Tier::Nk)
        );
        assert_eq!(
            strip_tier_suffix("Blood Test-P"),
            ("Blood Test".to_string(), Tier::P)
        );
        assert_eq!(
            strip_tier_suffix("Consultation Adult"),
            ("Consultation Adult".to_string(), Tier::None)
        );
    }

    #[test]
    fn tokenize_deduplicates_in_order() {
        assert_eq!(
            tokenize("scan chest scan CT"),
            vec!["scan", "chest", "ct"]
        );
    }

    #[test]
    fn token_set_splits_hyphenated_terms() {
        let tokens = token_set("chest x-ray");
        assert!(tokens.contains("chest"));
        assert!(tokens.contains("x"));
        assert!(tokens.contains("ray"));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn token_sets_match_across_synonym_spellings() {
        assert_eq!(token_set("xray chest"), token_set("chest x-ray"));
    }
}
