use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{EndpointDescriptor, EndpointKey, Inventory, Provenance};

pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCoverage {
    pub expected: usize,
    pub covered: usize,
    pub percentage: f64,
}

/// Expected-versus-observed endpoint comparison.
///
/// `covered` and `missing` partition the expected set; `extra` holds observed endpoints
/// matching nothing expected. All three lists are sorted by identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub provenance: Provenance,
    pub covered: Vec<EndpointDescriptor>,
    pub missing: Vec<EndpointDescriptor>,
    pub extra: Vec<EndpointDescriptor>,
    pub categories: BTreeMap<String, CategoryCoverage>,
    pub overall_percentage: f64,
}

impl CoverageReport {
    pub fn expected_len(&self) -> usize {
        self.covered.len() + self.missing.len()
    }

    pub fn percentage_by_category(&self) -> BTreeMap<String, f64> {
        self.categories
            .iter()
            .map(|(name, coverage)| (name.clone(), coverage.percentage))
            .collect()
    }
}

pub fn category_of(endpoint: &EndpointDescriptor) -> &str {
    if endpoint.category.is_empty() {
        UNCATEGORIZED
    } else {
        &endpoint.category
    }
}

/// `covered / expected * 100` to one decimal. Nothing expected counts as complete.
pub fn percentage(covered: usize, expected: usize) -> f64 {
    if expected == 0 {
        return 100.0;
    }
    let raw = covered as f64 * 100.0 / expected as f64;
    (raw * 10.0).round() / 10.0
}

fn by_identity(endpoints: &[EndpointDescriptor]) -> BTreeMap<EndpointKey, &EndpointDescriptor> {
    let mut map = BTreeMap::new();
    for endpoint in endpoints {
        map.entry(endpoint.key()).or_insert(endpoint);
    }
    map
}

/// Matches endpoints by method and normalized path. Duplicate identities count once.
pub fn compare(expected: &[EndpointDescriptor], observed: &[EndpointDescriptor]) -> CoverageReport {
    let expected = by_identity(expected);
    let observed = by_identity(observed);

    let mut covered = Vec::new();
    let mut missing = Vec::new();
    let mut categories: BTreeMap<String, CategoryCoverage> = BTreeMap::new();

    for (key, endpoint) in &expected {
        let category = categories
            .entry(category_of(endpoint).to_string())
            .or_insert(CategoryCoverage {
                expected: 0,
                covered: 0,
                percentage: 0.0,
            });
        category.expected += 1;

        if observed.contains_key(key) {
            category.covered += 1;
            covered.push((*endpoint).clone());
        } else {
            missing.push((*endpoint).clone());
        }
    }

    let extra: Vec<EndpointDescriptor> = observed
        .iter()
        .filter(|(key, _)| !expected.contains_key(*key))
        .map(|(_, endpoint)| (*endpoint).clone())
        .collect();

    for endpoint in &extra {
        categories
            .entry(category_of(endpoint).to_string())
            .or_insert(CategoryCoverage {
                expected: 0,
                covered: 0,
                percentage: 0.0,
            });
    }

    for category in categories.values_mut() {
        category.percentage = percentage(category.covered, category.expected);
    }

    let overall_percentage = percentage(covered.len(), expected.len());

    CoverageReport {
        provenance: Provenance::Observed,
        covered,
        missing,
        extra,
        categories,
        overall_percentage,
    }
}

/// Like [`compare`], tagging the report simulated when either input is.
pub fn compare_inventories(expected: &Inventory, observed: &Inventory) -> CoverageReport {
    let mut report = compare(&expected.endpoints, &observed.endpoints);
    if expected.provenance == Provenance::Simulated || observed.provenance == Provenance::Simulated {
        report.provenance = Provenance::Simulated;
    }
    report
}
