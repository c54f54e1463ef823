use std::sync::{Arc, Mutex, RwLock};

use crate::analyst::{HttpAnalyst, KeywordAnalyst, QueryAnalyst};
use crate::cache::QueryCache;
use crate::catalog::{self, CatalogSnapshot};
use crate::config::MedMatchConfig;
use crate::error::{MedMatchError, Result};
use crate::graph::RelationshipGraph;
use crate::models::{BaseService, ServiceRecord, Tier};

mod search_service;

/// The engine facade: an immutable catalog snapshot, the persistent
/// query cache, the relationship graph, and the analysis collaborator.
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct MedMatch {
    catalog: Arc<RwLock<Arc<CatalogSnapshot>>>,
    cache: QueryCache,
    graph: Arc<Mutex<RelationshipGraph>>,
    analyst: Arc<dyn QueryAnalyst>,
    config: MedMatchConfig,
}

impl std::fmt::Debug for MedMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MedMatch").finish_non_exhaustive()
    }
}

impl MedMatch {
    /// Loads the catalog from the configured source and brings the cache
    /// and graph up. The catalog is the only startup-fatal dependency.
    pub fn open(config: MedMatchConfig) -> Result<Self> {
        let snapshot = Arc::new(catalog::load(&config.catalog)?);
        let analyst: Arc<dyn QueryAnalyst> = if config.analyst.enabled {
            Arc::new(HttpAnalyst::new(&config.analyst)?)
        } else {
            Arc::new(KeywordAnalyst)
        };
        Self::with_catalog(config, snapshot, analyst)
    }

    /// Assembles the engine around an already-built snapshot and analyst.
    /// The seam for tests and for embedders that load catalogs their own
    /// way.
    pub fn with_catalog(
        config: MedMatchConfig,
        snapshot: Arc<CatalogSnapshot>,
        analyst: Arc<dyn QueryAnalyst>,
    ) -> Result<Self> {
        if snapshot.is_empty() {
            return Err(MedMatchError::CatalogUnavailable(
                "catalog contains no service records".to_string(),
            ));
        }
        let cache = QueryCache::open(&config.cache);
        let mut graph = RelationshipGraph::default();
        cache.replay_into(&mut graph);
        tracing::info!(
            records = snapshot.len(),
            cached_queries = cache.len(),
            graph_nodes = graph.node_count(),
            graph_edges = graph.edge_count(),
            "engine ready"
        );
        Ok(Self {
            catalog: Arc::new(RwLock::new(snapshot)),
            cache,
            graph: Arc::new(Mutex::new(graph)),
            analyst,
            config,
        })
    }

    /// Builds a fresh snapshot from the configured source and swaps it in
    /// atomically. Readers holding the old snapshot are unaffected.
    pub fn reload_catalog(&self) -> Result<usize> {
        let snapshot = Arc::new(catalog::load(&self.config.catalog)?);
        let count = snapshot.len();
        let mut guard = self
            .catalog
            .write()
            .map_err(|_| MedMatchError::mutex_poisoned("catalog"))?;
        *guard = snapshot;
        tracing::info!(records = count, "catalog snapshot replaced");
        Ok(count)
    }

    pub(crate) fn catalog_snapshot(&self) -> Result<Arc<CatalogSnapshot>> {
        let guard = self
            .catalog
            .read()
            .map_err(|_| MedMatchError::mutex_poisoned("catalog"))?;
        Ok(Arc::clone(&guard))
    }

    /// Min/max price across the tier variants of one underlying service.
    pub fn price_range(&self, base_description: &str, category: &str) -> Result<Option<(f64, f64)>> {
        let catalog = self.catalog_snapshot()?;
        Ok(catalog.price_range(base_description, category))
    }

    /// The variant of the base service priced under exactly `tier`.
    pub fn by_tier(
        &self,
        base_description: &str,
        category: &str,
        tier: Tier,
    ) -> Result<Option<ServiceRecord>> {
        let catalog = self.catalog_snapshot()?;
        Ok(catalog.by_tier(base_description, category, tier).cloned())
    }

    /// All tier variants of one underlying service.
    pub fn base_service(
        &self,
        base_description: &str,
        category: &str,
    ) -> Result<Option<BaseService>> {
        let catalog = self.catalog_snapshot()?;
        Ok(catalog.base_service(base_description, category))
    }

    /// Catalog records one `related` hop away from `code`.
    pub fn related_services(&self, code: &str, limit: usize) -> Result<Vec<ServiceRecord>> {
        let catalog = self.catalog_snapshot()?;
        let graph = self
            .graph
            .lock()
            .map_err(|_| MedMatchError::mutex_poisoned("relationship graph"))?;
        Ok(graph
            .related_to(code, limit)
            .into_iter()
            .filter_map(|related| catalog.record_by_code(&related).cloned())
            .collect())
    }

    pub fn catalog_len(&self) -> Result<usize> {
        Ok(self.catalog_snapshot()?.len())
    }

    #[must_use]
    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }
}
