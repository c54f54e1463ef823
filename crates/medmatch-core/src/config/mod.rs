use std::path::PathBuf;

use crate::error::{MedMatchError, Result};

mod env;

use env::{
    parse_enabled, parse_enabled_default_true, read_env_f32, read_env_u64, read_env_usize,
    read_non_empty_env,
};

const ENV_CATALOG: &str = "MEDMATCH_CATALOG";
const ENV_CATALOG_FORMAT: &str = "MEDMATCH_CATALOG_FORMAT";
const ENV_CACHE_PATH: &str = "MEDMATCH_CACHE_PATH";
const ENV_CACHE_SIMILARITY: &str = "MEDMATCH_CACHE_SIMILARITY";
const ENV_MATCH_LIMIT: &str = "MEDMATCH_MATCH_LIMIT";
const ENV_ANALYST: &str = "MEDMATCH_ANALYST";
const ENV_ANALYST_ENDPOINT: &str = "MEDMATCH_ANALYST_ENDPOINT";
const ENV_ANALYST_MODEL: &str = "MEDMATCH_ANALYST_MODEL";
const ENV_ANALYST_TIMEOUT_MS: &str = "MEDMATCH_ANALYST_TIMEOUT_MS";
const ENV_PRIORITY_RANKING: &str = "MEDMATCH_PRIORITY_RANKING";
const ENV_RELATED_LIMIT: &str = "MEDMATCH_RELATED_LIMIT";

const DEFAULT_CATALOG_PATH: &str = "services.sqlite3";
const DEFAULT_CACHE_PATH: &str = "query_cache.json";
const DEFAULT_CACHE_SIMILARITY: f32 = 0.5;
const DEFAULT_MATCH_LIMIT: usize = 10;
const DEFAULT_ANALYST_ENDPOINT: &str = "http://127.0.0.1:11434/api/chat";
const DEFAULT_ANALYST_MODEL: &str = "llama3";
const DEFAULT_ANALYST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RELATED_LIMIT: usize = 3;

/// Where the charge-sheet catalog is read from at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Sqlite(PathBuf),
    Csv(PathBuf),
}

impl CatalogSource {
    /// Infers the format from the file extension unless an explicit
    /// format override is given.
    fn parse(path: &str, format: Option<&str>) -> Result<Self> {
        let path = PathBuf::from(path);
        let normalized = format.map(|value| value.trim().to_ascii_lowercase());
        match normalized.as_deref() {
            Some("sqlite") => Ok(Self::Sqlite(path)),
            Some("csv") => Ok(Self::Csv(path)),
            Some(other) => Err(MedMatchError::Validation(format!(
                "invalid {ENV_CATALOG_FORMAT}: {other} (expected sqlite|csv)"
            ))),
            None => {
                let is_csv = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
                if is_csv {
                    Ok(Self::Csv(path))
                } else {
                    Ok(Self::Sqlite(path))
                }
            }
        }
    }
}

/// Integer scoring weights and the candidate cap. Public fields are the
/// tunables the source versions disagreed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherConfig {
    pub exact_phrase_weight: i64,
    pub ordered_tokens_weight: i64,
    pub unordered_tokens_weight: i64,
    pub boundary_token_weight: i64,
    pub midword_token_weight: i64,
    pub precision_bonus: i64,
    pub max_results: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            exact_phrase_weight: 100,
            ordered_tokens_weight: 75,
            unordered_tokens_weight: 50,
            boundary_token_weight: 20,
            midword_token_weight: 10,
            precision_bonus: 25,
            max_results: DEFAULT_MATCH_LIMIT,
        }
    }
}

impl MatcherConfig {
    fn from_env() -> Self {
        Self {
            max_results: read_env_usize(ENV_MATCH_LIMIT, DEFAULT_MATCH_LIMIT, 1),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub path: PathBuf,
    /// Approximate reuse fires when Jaccard similarity strictly exceeds
    /// this. `0.0` reuses any overlapping key; `>= 1.0` disables the
    /// approximate path.
    pub similarity_threshold: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            similarity_threshold: DEFAULT_CACHE_SIMILARITY,
        }
    }
}

impl CacheConfig {
    fn from_env() -> Self {
        Self {
            path: read_non_empty_env(ENV_CACHE_PATH)
                .map_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH), PathBuf::from),
            similarity_threshold: read_env_f32(ENV_CACHE_SIMILARITY)
                .map_or(DEFAULT_CACHE_SIMILARITY, |value| value.clamp(0.0, 1.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalystConfig {
    /// When disabled, the keyword table is the only analyst and no HTTP
    /// client is built.
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ANALYST_ENDPOINT.to_string(),
            model: DEFAULT_ANALYST_MODEL.to_string(),
            timeout_ms: DEFAULT_ANALYST_TIMEOUT_MS,
        }
    }
}

impl AnalystConfig {
    fn from_env() -> Self {
        Self {
            enabled: parse_enabled_default_true(
                std::env::var(ENV_ANALYST).ok().as_deref(),
            ),
            endpoint: read_non_empty_env(ENV_ANALYST_ENDPOINT)
                .unwrap_or_else(|| DEFAULT_ANALYST_ENDPOINT.to_string()),
            model: read_non_empty_env(ENV_ANALYST_MODEL)
                .unwrap_or_else(|| DEFAULT_ANALYST_MODEL.to_string()),
            timeout_ms: read_env_u64(ENV_ANALYST_TIMEOUT_MS, DEFAULT_ANALYST_TIMEOUT_MS, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingConfig {
    /// When set, an emergency-priority analysis flattens the category
    /// preference so critical cross-category services are not buried.
    pub priority_ranking: bool,
    /// Cap on related suggestions appended after the primary results.
    pub related_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            priority_ranking: false,
            related_limit: DEFAULT_RELATED_LIMIT,
        }
    }
}

impl RankingConfig {
    fn from_env() -> Self {
        Self {
            priority_ranking: parse_enabled(
                std::env::var(ENV_PRIORITY_RANKING).ok().as_deref(),
            ),
            related_limit: read_env_usize(ENV_RELATED_LIMIT, DEFAULT_RELATED_LIMIT, 0),
        }
    }
}

/// Constructed-once configuration for the whole engine. Defaults suit
/// tests and embedding; `from_env` reads the `MEDMATCH_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct MedMatchConfig {
    pub catalog: CatalogSource,
    pub matcher: MatcherConfig,
    pub cache: CacheConfig,
    pub analyst: AnalystConfig,
    pub ranking: RankingConfig,
}

impl Default for MedMatchConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogSource::Sqlite(PathBuf::from(DEFAULT_CATALOG_PATH)),
            matcher: MatcherConfig::default(),
            cache: CacheConfig::default(),
            analyst: AnalystConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

impl MedMatchConfig {
    pub fn from_env() -> Result<Self> {
        let catalog_path =
            read_non_empty_env(ENV_CATALOG).unwrap_or_else(|| DEFAULT_CATALOG_PATH.to_string());
        Ok(Self {
            catalog: CatalogSource::parse(
                &catalog_path,
                read_non_empty_env(ENV_CATALOG_FORMAT).as_deref(),
            )?,
            matcher: MatcherConfig::from_env(),
            cache: CacheConfig::from_env(),
            analyst: AnalystConfig::from_env(),
            ranking: RankingConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogSource, MatcherConfig, MedMatchConfig};
    use std::path::PathBuf;

    #[test]
    fn catalog_source_infers_format_from_extension() {
        assert_eq!(
            CatalogSource::parse("charges.csv", None).expect("csv source"),
            CatalogSource::Csv(PathBuf::from("charges.csv"))
        );
        assert_eq!(
            CatalogSource::parse("services.sqlite3", None).expect("sqlite source"),
            CatalogSource::Sqlite(PathBuf::from("services.sqlite3"))
        );
    }

    #[test]
    fn catalog_source_honours_explicit_format_override() {
        assert_eq!(
            CatalogSource::parse("charges.dat", Some("csv")).expect("csv source"),
            CatalogSource::Csv(PathBuf::from("charges.dat"))
        );
    }

    #[test]
    fn catalog_source_rejects_unknown_formats() {
        assert!(CatalogSource::parse("charges.dat", Some("parquet")).is_err());
    }

    #[test]
    fn default_scoring_weights_match_the_published_scheme() {
        let config = MatcherConfig::default();
        assert_eq!(config.exact_phrase_weight, 100);
        assert_eq!(config.ordered_tokens_weight, 75);
        assert_eq!(config.unordered_tokens_weight, 50);
        assert_eq!(config.boundary_token_weight, 20);
        assert_eq!(config.midword_token_weight, 10);
        assert_eq!(config.precision_bonus, 25);
        assert_eq!(config.max_results, 10);
    }

    #[test]
    fn default_config_keeps_the_approximate_cache_enabled() {
        let config = MedMatchConfig::default();
        assert!((config.cache.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert!(!config.ranking.priority_ranking);
        assert_eq!(config.analyst.timeout_ms, 10_000);
    }
}
