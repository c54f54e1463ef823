use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::normalize;

/// Pricing class attached to one variant of an underlying service.
///
/// Charge sheets publish the same service up to three times with a
/// `-K` / `-Nk` / `-P` description suffix; records without a suffix are
/// `Tier::None`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    K,
    Nk,
    P,
    #[default]
    None,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::K => "K",
            Self::Nk => "Nk",
            Self::P => "P",
            Self::None => "",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One priced line-item from the charge sheet. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub code: String,
    pub description: String,
    pub category: String,
    pub base_price: f64,
    pub max_price: f64,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub base_description: String,
}

impl ServiceRecord {
    /// Builds a record from raw catalog fields, deriving the tier and the
    /// normalized base description from the stored description, and
    /// defaulting `max_price` to `base_price` when the source has none.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
        base_price: f64,
        max_price: Option<f64>,
    ) -> Self {
        let description = description.into();
        let (stem, tier) = normalize::strip_tier_suffix(&description);
        Self {
            code: code.into(),
            category: category.into(),
            base_price,
            max_price: max_price.unwrap_or(base_price),
            tier,
            base_description: normalize::normalize(&stem),
            description,
        }
    }

    /// Records without a positive base price exist in the sheet but are
    /// never offered as matches.
    #[must_use]
    pub fn is_searchable(&self) -> bool {
        self.base_price > 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Routine,
    Urgent,
    Emergency,
}

impl Priority {
    pub(crate) fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "urgent" => Self::Urgent,
            "emergency" => Self::Emergency,
            _ => Self::Routine,
        }
    }
}

/// Where a query analysis came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Collaborator,
    #[default]
    Fallback,
    Cache,
}

/// Relationship facts the collaborator may attach to an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationObservation {
    pub code: String,
    #[serde(default)]
    pub related: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

/// Structured reading of a free-text query: which category to search and
/// with which terms. Produced by the collaborator, the keyword fallback,
/// or replayed from the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub search_terms: Vec<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub source: AnalysisSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationObservation>,
}

/// A catalog record scored against one search term.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub record: ServiceRecord,
    pub score: i64,
    pub term: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    Primary,
    Related,
}

/// A final result row: the record, how it scored, whether it is a primary
/// match or a related suggestion, and its price range across tier
/// variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedService {
    pub record: ServiceRecord,
    pub score: i64,
    pub origin: ResultOrigin,
    pub min_price: f64,
    pub max_price: f64,
}

/// The public answer to one `search` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<RankedService>,
    pub min_price: f64,
    pub max_price: f64,
    pub related_codes: Vec<String>,
    pub analysis: QueryAnalysis,
}

impl SearchResponse {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Primary rows only; related suggestions are appended after these.
    pub fn primary(&self) -> impl Iterator<Item = &RankedService> {
        self.results
            .iter()
            .filter(|row| row.origin == ResultOrigin::Primary)
    }
}

/// One cached query resolution, keyed externally by the normalized query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub analysis: QueryAnalysis,
    pub results: Vec<RankedService>,
    pub created_at: DateTime<Utc>,
}

/// All tier variants of one underlying service. Derived on demand from
/// the catalog, never stored.
#[derive(Debug, Clone, Default)]
pub struct BaseService {
    pub base_description: String,
    pub category: String,
    pub tiers: BTreeMap<Tier, ServiceRecord>,
}

#[cfg(test)]
mod tests {
    use super::{Priority, ServiceRecord, Tier};

    #[test]
    fn record_constructor_derives_tier_and_base_description() {
        let record = ServiceRecord::new("GENERAL", "BT001-K", "Blood Test-K", 200.0, None);
        assert_eq!(record.tier, Tier::K);
        assert_eq!(record.base_description, "blood test");
        assert_eq!(record.max_price, 200.0);
    }

    #[test]
    fn record_constructor_keeps_explicit_max_price() {
        let record = ServiceRecord::new("GENERAL", "BT001", "Blood Test", 200.0, Some(450.0));
        assert_eq!(record.tier, Tier::None);
        assert_eq!(record.max_price, 450.0);
    }

    #[test]
    fn zero_priced_records_are_not_searchable() {
        let record = ServiceRecord::new("GENERAL", "NA001", "Placeholder", 0.0, None);
        assert!(!record.is_searchable());
    }

    #[test]
    fn priority_parser_defaults_to_routine_for_unknown_labels() {
        assert_eq!(Priority::parse("Emergency"), Priority::Emergency);
        assert_eq!(Priority::parse("URGENT"), Priority::Urgent);
        assert_eq!(Priority::parse("soonish"), Priority::Routine);
    }
}
