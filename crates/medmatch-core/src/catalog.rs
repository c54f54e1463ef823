use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;

use crate::config::CatalogSource;
use crate::error::{MedMatchError, Result};
use crate::models::{ServiceRecord, Tier};

/// Immutable, read-only view of the loaded charge sheet. Built once and
/// shared; a reload constructs a whole new snapshot and swaps it in.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    records: Vec<ServiceRecord>,
    by_category: HashMap<String, Vec<usize>>,
    by_code: HashMap<String, usize>,
    tier_index: HashMap<(String, String), BTreeMap<Tier, usize>>,
}

impl CatalogSnapshot {
    pub fn from_records(records: Vec<ServiceRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(MedMatchError::CatalogUnavailable(
                "catalog contains no service records".to_string(),
            ));
        }

        let mut by_category: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_code: HashMap<String, usize> = HashMap::new();
        let mut tier_index: HashMap<(String, String), BTreeMap<Tier, usize>> = HashMap::new();

        for (position, record) in records.iter().enumerate() {
            by_category
                .entry(category_key(&record.category))
                .or_default()
                .push(position);
            by_code.entry(record.code.clone()).or_insert(position);
            tier_index
                .entry((
                    record.base_description.clone(),
                    category_key(&record.category),
                ))
                .or_default()
                .entry(record.tier)
                .or_insert(position);
        }

        Ok(Self {
            records,
            by_category,
            by_code,
            tier_index,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut out: Vec<String> = self.by_category.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn category_records(&self, category: &str) -> impl Iterator<Item = &ServiceRecord> {
        self.by_category
            .get(&category_key(category))
            .into_iter()
            .flatten()
            .map(|position| &self.records[*position])
    }

    #[must_use]
    pub fn record_by_code(&self, code: &str) -> Option<&ServiceRecord> {
        self.by_code.get(code).map(|position| &self.records[*position])
    }

    pub(crate) fn tier_variants(
        &self,
        base_description: &str,
        category: &str,
    ) -> Option<&BTreeMap<Tier, usize>> {
        self.tier_index.get(&(
            crate::normalize::normalize(base_description),
            category_key(category),
        ))
    }

    pub(crate) fn record_at(&self, position: usize) -> &ServiceRecord {
        &self.records[position]
    }
}

/// Category lookups are case-insensitive; the sheet stores upper-case
/// section names while the collaborator answers in mixed case.
pub(crate) fn category_key(category: &str) -> String {
    category.trim().to_uppercase()
}

/// Loads the configured catalog source. Missing or empty sources are a
/// startup-fatal `CatalogUnavailable`.
pub fn load(source: &CatalogSource) -> Result<CatalogSnapshot> {
    let snapshot = match source {
        CatalogSource::Sqlite(path) => load_sqlite(path)?,
        CatalogSource::Csv(path) => load_csv(path)?,
    };
    tracing::info!(
        records = snapshot.len(),
        categories = snapshot.categories().len(),
        "catalog loaded"
    );
    Ok(snapshot)
}

fn ensure_source_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(MedMatchError::CatalogUnavailable(format!(
            "missing catalog source: {}",
            path.display()
        )));
    }
    Ok(())
}

fn load_sqlite(path: &Path) -> Result<CatalogSnapshot> {
    ensure_source_exists(path)?;
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(
        "SELECT category, code, description, base_price, max_price FROM services",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<f64>>(3)?,
            row.get::<_, Option<f64>>(4)?,
        ))
    })?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let (category, code, description, base_price, max_price) = row?;
        let Some(base_price) = base_price else {
            skipped += 1;
            continue;
        };
        records.push(ServiceRecord::new(
            category,
            code,
            description,
            base_price,
            max_price,
        ));
    }
    if skipped > 0 {
        tracing::warn!(skipped, "catalog rows without a base price were skipped");
    }
    CatalogSnapshot::from_records(records)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    category: String,
    code: String,
    description: String,
    base_price: String,
    #[serde(default)]
    max_price: Option<String>,
}

fn load_csv(path: &Path) -> Result<CatalogSnapshot> {
    ensure_source_exists(path)?;
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        let Some(base_price) = parse_price(&row.base_price) else {
            skipped += 1;
            continue;
        };
        let max_price = row.max_price.as_deref().and_then(parse_price);
        records.push(ServiceRecord::new(
            row.category,
            row.code,
            row.description,
            base_price,
            max_price,
        ));
    }
    if skipped > 0 {
        tracing::warn!(skipped, "catalog rows without a base price were skipped");
    }
    CatalogSnapshot::from_records(records)
}

/// Sheet prices arrive as `1,500` or `KES 1500.00`; strip the currency
/// marker and thousands separators before parsing.
fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = raw
        .trim()
        .trim_start_matches("KES")
        .trim_start_matches("kes")
        .replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::{CatalogSnapshot, parse_price};
    use crate::models::{ServiceRecord, Tier};

    fn fixture_records() -> Vec<ServiceRecord> {
        vec![
            ServiceRecord::new("RADIOLOGY", "XR1020", "Chest X-ray", 500.0, None),
            ServiceRecord::new("GENERAL", "AC001", "Consultation Adult", 150.0, None),
            ServiceRecord::new("GENERAL", "BT-K", "Blood Test-K", 200.0, None),
            ServiceRecord::new("GENERAL", "BT-NK", "Blood Test-Nk", 350.0, None),
        ]
    }

    #[test]
    fn from_records_rejects_an_empty_catalog() {
        let err = CatalogSnapshot::from_records(Vec::new()).expect_err("must refuse empty");
        assert_eq!(err.code(), "CATALOG_UNAVAILABLE");
    }

    #[test]
    fn category_lookup_is_case_insensitive() {
        let catalog = CatalogSnapshot::from_records(fixture_records()).expect("catalog");
        let codes: Vec<&str> = catalog
            .category_records("Radiology")
            .map(|record| record.code.as_str())
            .collect();
        assert_eq!(codes, vec!["XR1020"]);
    }

    #[test]
    fn tier_variants_group_by_base_description() {
        let catalog = CatalogSnapshot::from_records(fixture_records()).expect("catalog");
        let variants = catalog
            .tier_variants("Blood Test", "GENERAL")
            .expect("blood test variants");
        assert!(variants.contains_key(&Tier::K));
        assert!(variants.contains_key(&Tier::Nk));
        assert_eq!(variants.len(), 2);
    }

    #[test]
    fn record_by_code_finds_exact_codes() {
        let catalog = CatalogSnapshot::from_records(fixture_records()).expect("catalog");
        let record = catalog.record_by_code("XR1020").expect("record");
        assert_eq!(record.description, "Chest X-ray");
        assert!(catalog.record_by_code("missing").is_none());
    }

    #[test]
    fn price_parser_handles_sheet_formatting() {
        assert_eq!(parse_price("1,500"), Some(1500.0));
        assert_eq!(parse_price("KES 2500.50"), Some(2500.5));
        assert_eq!(parse_price("  "), None);
        assert_eq!(parse_price("n/a"), None);
    }
}
