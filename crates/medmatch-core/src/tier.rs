use crate::catalog::CatalogSnapshot;
use crate::models::{BaseService, ServiceRecord, Tier};

/// Tier resolution over the loaded catalog: the same underlying service
/// can exist as K / Nk / P priced variants, identified by a shared base
/// description within a category.
impl CatalogSnapshot {
    /// Price range across whichever tier variants exist for the base
    /// description. Absent tiers are skipped, never treated as zero. The
    /// range spans the cheapest `base_price` to the highest `max_price`.
    #[must_use]
    pub fn price_range(&self, base_description: &str, category: &str) -> Option<(f64, f64)> {
        let variants = self.tier_variants(base_description, category)?;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for position in variants.values() {
            let record = self.record_at(*position);
            min = min.min(record.base_price);
            max = max.max(record.max_price);
        }
        if min.is_finite() && max.is_finite() {
            Some((min, max))
        } else {
            None
        }
    }

    /// The variant of `base_description` priced under exactly `tier`.
    #[must_use]
    pub fn by_tier(
        &self,
        base_description: &str,
        category: &str,
        tier: Tier,
    ) -> Option<&ServiceRecord> {
        let variants = self.tier_variants(base_description, category)?;
        let record = self.record_at(*variants.get(&tier)?);
        debug_assert_eq!(record.tier, tier);
        Some(record)
    }

    /// All tier variants of one underlying service, computed on demand.
    #[must_use]
    pub fn base_service(&self, base_description: &str, category: &str) -> Option<BaseService> {
        let variants = self.tier_variants(base_description, category)?;
        let mut out = BaseService {
            base_description: crate::normalize::normalize(base_description),
            category: crate::catalog::category_key(category),
            ..BaseService::default()
        };
        for (tier, position) in variants {
            out.tiers.insert(*tier, self.record_at(*position).clone());
        }
        Some(out)
    }

    /// Price range for a single record: its own tier group when one
    /// exists, otherwise its own base/max prices.
    #[must_use]
    pub(crate) fn record_price_range(&self, record: &ServiceRecord) -> (f64, f64) {
        self.price_range(&record.base_description, &record.category)
            .unwrap_or((record.base_price, record.max_price))
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::CatalogSnapshot;
    use crate::models::{ServiceRecord, Tier};

    fn catalog_with_tiers() -> CatalogSnapshot {
        CatalogSnapshot::from_records(vec![
            ServiceRecord::new("GENERAL", "BT-K", "Blood Test-K", 200.0, None),
            ServiceRecord::new("GENERAL", "BT-NK", "Blood Test-Nk", 350.0, None),
            ServiceRecord::new("RADIOLOGY", "XR1020", "Chest X-ray", 500.0, Some(650.0)),
        ])
        .expect("catalog")
    }

    #[test]
    fn price_range_spans_existing_tiers_only() {
        let catalog = catalog_with_tiers();
        assert_eq!(
            catalog.price_range("Blood Test", "GENERAL"),
            Some((200.0, 350.0))
        );
    }

    #[test]
    fn price_range_is_none_for_unknown_base_descriptions() {
        let catalog = catalog_with_tiers();
        assert_eq!(catalog.price_range("Dialysis", "GENERAL"), None);
    }

    #[test]
    fn by_tier_returns_the_requested_tier_exactly() {
        let catalog = catalog_with_tiers();
        let record = catalog
            .by_tier("Blood Test", "GENERAL", Tier::Nk)
            .expect("nk variant");
        assert_eq!(record.tier, Tier::Nk);
        assert_eq!(record.base_price, 350.0);
        assert!(catalog.by_tier("Blood Test", "GENERAL", Tier::P).is_none());
    }

    #[test]
    fn untiered_records_resolve_under_tier_none() {
        let catalog = catalog_with_tiers();
        let record = catalog
            .by_tier("Chest X-ray", "RADIOLOGY", Tier::None)
            .expect("untiered variant");
        assert_eq!(record.code, "XR1020");
        assert_eq!(
            catalog.price_range("chest x-ray", "radiology"),
            Some((500.0, 650.0))
        );
    }

    #[test]
    fn base_service_collects_all_variants() {
        let catalog = catalog_with_tiers();
        let base = catalog
            .base_service("Blood Test", "general")
            .expect("base service");
        assert_eq!(base.base_description, "blood test");
        assert_eq!(base.category, "GENERAL");
        assert_eq!(base.tiers.len(), 2);
    }
}
