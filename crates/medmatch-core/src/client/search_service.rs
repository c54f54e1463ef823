use chrono::Utc;

use crate::aggregate;
use crate::cache;
use crate::catalog::{CatalogSnapshot, category_key};
use crate::error::{MedMatchError, Result};
use crate::matcher;
use crate::models::{
    AnalysisSource, CacheEntry, Priority, QueryAnalysis, RankedService, ResultOrigin,
    SearchResponse,
};
use crate::normalize;

use super::MedMatch;

/// Broad sweep used when no search term matched anything at all; the
/// cheapest consultation-style services still give the caller a starting
/// point.
const FALLBACK_TERMS: &[&str] = &["consultation", "examination"];

impl MedMatch {
    /// Resolves a free-text query to ranked, priced catalog services.
    ///
    /// Walks `CacheLookup → ExternalAnalysis → Match → TierResolve →
    /// Aggregate → CacheStore`. Every branch terminates in a returned
    /// response: an empty query yields an empty response, a collaborator
    /// failure degrades to the keyword fallback, and a cache-store
    /// failure still returns the computed result.
    pub fn search(&self, query: &str, category_hint: Option<&str>) -> Result<SearchResponse> {
        let normalized = normalize::normalize(query);
        if normalized.is_empty() {
            return Ok(SearchResponse::empty());
        }

        let catalog = self.catalog_snapshot()?;

        if let Some(entry) = self.cache.get(query) {
            tracing::debug!(query = %normalized, "serving query from cache");
            return self.response_from_entry(&catalog, entry);
        }

        // The collaborator call happens before any cache or graph lock is
        // taken, so a slow model never blocks other callers.
        let mut analysis = self.resolve_analysis(query);
        if let Some(hint) = category_hint
            && !hint.trim().is_empty()
        {
            analysis.category = hint.trim().to_string();
        }

        let response = self.run_pipeline(&catalog, &normalized, analysis)?;
        self.store(query, &response);
        Ok(response)
    }

    fn resolve_analysis(&self, query: &str) -> QueryAnalysis {
        match self.analyst.analyze(query) {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "collaborator analysis failed; degrading to keyword fallback"
                );
                crate::analyst::KeywordAnalyst::classify(query)
            }
        }
    }

    fn run_pipeline(
        &self,
        catalog: &CatalogSnapshot,
        normalized_query: &str,
        analysis: QueryAnalysis,
    ) -> Result<SearchResponse> {
        let categories = search_categories(catalog, &analysis.category);

        let mut batches = Vec::new();
        for term in &analysis.search_terms {
            for category in &categories {
                batches.push(matcher::find(catalog, &self.config.matcher, category, term));
            }
        }
        if batches.iter().all(Vec::is_empty) {
            tracing::debug!(query = %normalized_query, "no term matched; broadening search");
            for term in FALLBACK_TERMS {
                for category in &categories {
                    batches.push(matcher::find(catalog, &self.config.matcher, category, term));
                }
            }
        }

        let flatten_categories = self.config.ranking.priority_ranking
            && analysis.priority == Priority::Emergency;
        let primary = aggregate::aggregate(
            batches,
            &normalize::token_set(normalized_query),
            &analysis.category,
            flatten_categories,
        );

        let primary_codes: Vec<String> = primary
            .iter()
            .map(|candidate| candidate.record.code.clone())
            .collect();
        let related = {
            let graph = self
                .graph
                .lock()
                .map_err(|_| MedMatchError::mutex_poisoned("relationship graph"))?;
            aggregate::related_records(
                &primary_codes,
                &graph,
                catalog,
                self.config.ranking.related_limit,
            )
        };

        let mut rows = aggregate::primary_rows(catalog, primary);
        rows.extend(aggregate::related_rows(catalog, related));
        Ok(assemble_response(rows, analysis))
    }

    /// Rebuilds a response from a cached entry. Stored rows are the
    /// primary results; related suggestions are re-derived from the
    /// current graph so later observations surface on old queries.
    fn response_from_entry(
        &self,
        catalog: &CatalogSnapshot,
        entry: CacheEntry,
    ) -> Result<SearchResponse> {
        let mut analysis = entry.analysis;
        analysis.source = AnalysisSource::Cache;

        let mut rows = entry.results;
        rows.retain(|row| row.origin == ResultOrigin::Primary);
        let primary_codes: Vec<String> = rows
            .iter()
            .map(|row| row.record.code.clone())
            .collect();
        let related = {
            let graph = self
                .graph
                .lock()
                .map_err(|_| MedMatchError::mutex_poisoned("relationship graph"))?;
            aggregate::related_records(
                &primary_codes,
                &graph,
                catalog,
                self.config.ranking.related_limit,
            )
        };
        rows.extend(aggregate::related_rows(catalog, related));
        Ok(assemble_response(rows, analysis))
    }

    /// CacheStore: commits the resolved query. Graph observation and the
    /// cache write are the only mutations in the pipeline; a persistence
    /// failure is logged and the response is returned regardless.
    fn store(&self, query: &str, response: &SearchResponse) {
        let entry = CacheEntry {
            analysis: response.analysis.clone(),
            results: response.primary().cloned().collect(),
            created_at: Utc::now(),
        };
        match self.graph.lock() {
            Ok(mut graph) => cache::observe_entry(&mut graph, &entry),
            Err(_) => {
                tracing::warn!("relationship graph lock poisoned; skipping observation");
            }
        }
        if let Err(err) = self.cache.put(query, entry) {
            tracing::warn!(error = %err, "query cache write failed; continuing in-memory");
        }
    }
}

/// The preferred category is searched first, then every other catalog
/// category in stable order.
fn search_categories(catalog: &CatalogSnapshot, preferred: &str) -> Vec<String> {
    let preferred_key = category_key(preferred);
    let mut out = vec![preferred_key.clone()];
    for category in catalog.categories() {
        if category != preferred_key {
            out.push(category);
        }
    }
    out
}

fn assemble_response(rows: Vec<RankedService>, analysis: QueryAnalysis) -> SearchResponse {
    let (min_price, max_price) = aggregate::price_totals(&rows);
    let related_codes = rows
        .iter()
        .filter(|row| row.origin == ResultOrigin::Related)
        .map(|row| row.record.code.clone())
        .collect();
    SearchResponse {
        results: rows,
        min_price,
        max_price,
        related_codes,
        analysis,
    }
}
