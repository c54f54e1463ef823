use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::CacheConfig;
use crate::error::{MedMatchError, Result};
use crate::graph::RelationshipGraph;
use crate::models::CacheEntry;
use crate::normalize;

/// Persistent query cache: exact reuse on the normalized query, plus
/// approximate reuse by Jaccard token similarity against cached keys.
///
/// The on-disk form is one JSON object `{ normalized_query: entry }`. A
/// missing or corrupt store never fails startup; persistence failures
/// drop the cache to in-memory-only for the rest of the process.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    path: PathBuf,
    similarity_threshold: f32,
    persist_disabled: bool,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache").finish_non_exhaustive()
    }
}

impl QueryCache {
    /// Loads the cache document tolerantly. Never errors: a missing file
    /// is an empty cache, a corrupt one is logged and discarded.
    #[must_use]
    pub fn open(config: &CacheConfig) -> Self {
        let entries = match std::fs::read_to_string(&config.path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(
                        path = %config.path.display(),
                        error = %err,
                        "query cache document is corrupt; starting with an empty cache"
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                tracing::warn!(
                    path = %config.path.display(),
                    error = %err,
                    "query cache document is unreadable; starting with an empty cache"
                );
                HashMap::new()
            }
        };
        if !entries.is_empty() {
            tracing::info!(entries = entries.len(), "query cache loaded");
        }
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries,
                path: config.path.clone(),
                similarity_threshold: config.similarity_threshold,
                persist_disabled: false,
            })),
        }
    }

    /// Exact lookup on `normalize(query)`, then nearest cached key by
    /// Jaccard similarity when it strictly exceeds the threshold.
    #[must_use]
    pub fn get(&self, query: &str) -> Option<CacheEntry> {
        let key = normalize::normalize(query);
        if key.is_empty() {
            return None;
        }
        let inner = self.inner.lock().ok()?;
        if let Some(entry) = inner.entries.get(&key) {
            return Some(entry.clone());
        }

        let query_tokens = normalize::token_set(&key);
        let mut best: Option<(&String, f32)> = None;
        for cached_key in inner.entries.keys() {
            let similarity = jaccard(&query_tokens, &normalize::token_set(cached_key));
            if similarity <= inner.similarity_threshold {
                continue;
            }
            let better = best.is_none_or(|(current_key, current)| {
                similarity > current || (similarity == current && cached_key < current_key)
            });
            if better {
                best = Some((cached_key, similarity));
            }
        }
        let (matched_key, similarity) = best?;
        tracing::debug!(query = %key, matched = %matched_key, similarity, "approximate cache hit");
        inner.entries.get(matched_key).cloned()
    }

    /// Writes the entry under the exact normalized key, overwriting any
    /// prior entry, and persists the full document. A persistence failure
    /// is reported once and then the cache stays in-memory-only.
    pub fn put(&self, query: &str, entry: CacheEntry) -> Result<()> {
        let key = normalize::normalize(query);
        if key.is_empty() {
            return Ok(());
        }
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| MedMatchError::mutex_poisoned("query cache"))?;
        inner.entries.insert(key, entry);
        if inner.persist_disabled {
            return Ok(());
        }
        if let Err(err) = persist(&inner.path, &inner.entries) {
            inner.persist_disabled = true;
            return Err(MedMatchError::CachePersist(err.to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replays every cached entry through the graph. Idempotent because
    /// graph insertion is set-backed; called once at startup.
    pub fn replay_into(&self, graph: &mut RelationshipGraph) {
        let Ok(inner) = self.inner.lock() else {
            return;
        };
        for entry in inner.entries.values() {
            observe_entry(graph, entry);
        }
    }
}

/// Feeds one cache entry into the graph: the collaborator's explicit
/// relation observations, plus co-occurrence of the entry's result codes
/// (services answered together are related to each other).
pub(crate) fn observe_entry(graph: &mut RelationshipGraph, entry: &CacheEntry) {
    for observation in &entry.analysis.relations {
        graph.add_observation(
            &observation.code,
            &observation.related,
            &observation.prerequisites,
            &observation.follow_ups,
        );
    }

    let codes: Vec<String> = entry
        .results
        .iter()
        .map(|row| row.record.code.clone())
        .collect();
    for code in &codes {
        graph.add_observation(code, &codes, &[], &[]);
    }
}

fn persist(path: &std::path::Path, entries: &HashMap<String, CacheEntry>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, payload)?;
    Ok(())
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = usize_to_f32(a.intersection(b).count());
    let union = usize_to_f32(a.union(b).count());
    if union == 0.0 { 0.0 } else { intersection / union }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "similarity ratios are intentionally lossy floating-point values"
)]
const fn usize_to_f32(value: usize) -> f32 {
    value as f32
}

#[cfg(test)]
mod tests {
    use super::{QueryCache, jaccard, observe_entry};
    use crate::config::CacheConfig;
    use crate::graph::RelationshipGraph;
    use crate::models::{
        CacheEntry, QueryAnalysis, RankedService, ResultOrigin, ServiceRecord,
    };
    use crate::normalize;
    use chrono::Utc;

    fn entry_with_codes(codes: &[&str]) -> CacheEntry {
        CacheEntry {
            analysis: QueryAnalysis::default(),
            results: codes
                .iter()
                .map(|code| RankedService {
                    record: ServiceRecord::new("GENERAL", *code, "Blood Test", 200.0, None),
                    score: 100,
                    origin: ResultOrigin::Primary,
                    min_price: 200.0,
                    max_price: 200.0,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn cache_at(dir: &tempfile::TempDir, threshold: f32) -> QueryCache {
        QueryCache::open(&CacheConfig {
            path: dir.path().join("query_cache.json"),
            similarity_threshold: threshold,
        })
    }

    #[test]
    fn put_overwrites_instead_of_duplicating() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_at(&dir, 0.5);
        cache
            .put("Blood  TEST price", entry_with_codes(&["BT-K"]))
            .expect("first put");
        cache
            .put("blood test price", entry_with_codes(&["BT-NK"]))
            .expect("second put");
        assert_eq!(cache.len(), 1);
        let entry = cache.get("blood test price").expect("entry");
        assert_eq!(entry.results[0].record.code, "BT-NK");
    }

    #[test]
    fn similar_queries_reuse_the_cached_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_at(&dir, 0.5);
        cache
            .put("blood test price list", entry_with_codes(&["BT-K"]))
            .expect("put");
        // Word order and pluralization both stay above the threshold.
        assert!(cache.get("price list blood test").is_some());
        assert!(cache.get("blood tests price list").is_some());
        // A disjoint query misses.
        assert!(cache.get("dental cleaning").is_none());
    }

    #[test]
    fn threshold_one_disables_the_approximate_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_at(&dir, 1.0);
        cache
            .put("blood test price", entry_with_codes(&["BT-K"]))
            .expect("put");
        assert!(cache.get("blood test price").is_some());
        assert!(cache.get("price blood test").is_none());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let cache = cache_at(&dir, 0.5);
            cache
                .put("chest x-ray cost", entry_with_codes(&["XR1020"]))
                .expect("put");
        }
        let reopened = cache_at(&dir, 0.5);
        assert_eq!(reopened.len(), 1);
        let entry = reopened.get("chest x-ray cost").expect("entry");
        assert_eq!(entry.results[0].record.code, "XR1020");
    }

    #[test]
    fn corrupt_store_starts_empty_without_failing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("query_cache.json");
        std::fs::write(&path, "{ not json").expect("write corrupt file");
        let cache = QueryCache::open(&CacheConfig {
            path,
            similarity_threshold: 0.5,
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn replay_is_idempotent_on_the_graph() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_at(&dir, 0.5);
        cache
            .put("blood test", entry_with_codes(&["BT-K", "BT-NK"]))
            .expect("put");

        let mut graph = RelationshipGraph::default();
        cache.replay_into(&mut graph);
        let first = graph.edge_count();
        cache.replay_into(&mut graph);
        assert_eq!(graph.edge_count(), first);
        assert_eq!(first, 2);
    }

    #[test]
    fn observe_entry_links_co_occurring_results_bidirectionally() {
        let mut graph = RelationshipGraph::default();
        observe_entry(&mut graph, &entry_with_codes(&["XR1020", "AC001"]));
        assert_eq!(graph.related_to("XR1020", 5), vec!["AC001".to_string()]);
        assert_eq!(graph.related_to("AC001", 5), vec!["XR1020".to_string()]);
    }

    #[test]
    fn jaccard_matches_the_set_definition() {
        let a = normalize::token_set("chest x-ray");
        let b = normalize::token_set("xray chest");
        assert!((jaccard(&a, &b) - 1.0).abs() < f32::EPSILON);
        let c = normalize::token_set("dental cleaning");
        assert_eq!(jaccard(&a, &c), 0.0);
    }
}
