use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::delta::CoverageReport;
use crate::error::{HarnessError, Result};
use crate::models::{EndpointDescriptor, EndpointKey, Provenance};

/// Category movement between two reports. `None` means the category is absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTrend {
    pub before: Option<f64>,
    pub after: Option<f64>,
    pub delta: Option<f64>,
}

/// Before/after comparison of two real coverage reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageTrend {
    pub provenance: Provenance,
    pub overall_before: f64,
    pub overall_after: f64,
    pub overall_delta: f64,
    pub categories: BTreeMap<String, CategoryTrend>,
    pub newly_covered: Vec<EndpointKey>,
    pub newly_missing: Vec<EndpointKey>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn keys(endpoints: &[EndpointDescriptor]) -> BTreeSet<EndpointKey> {
    endpoints.iter().map(EndpointDescriptor::key).collect()
}

impl CoverageTrend {
    pub fn between(before: &CoverageReport, after: &CoverageReport) -> Result<Self> {
        if before.provenance != after.provenance {
            return Err(HarnessError::ProvenanceMismatch {
                left: before.provenance.to_string(),
                right: after.provenance.to_string(),
            });
        }

        let names: BTreeSet<&String> = before.categories.keys().chain(after.categories.keys()).collect();
        let categories = names
            .into_iter()
            .map(|name| {
                let was = before.categories.get(name).map(|c| c.percentage);
                let now = after.categories.get(name).map(|c| c.percentage);
                let delta = was.zip(now).map(|(was, now)| round1(now - was));
                (
                    name.clone(),
                    CategoryTrend {
                        before: was,
                        after: now,
                        delta,
                    },
                )
            })
            .collect();

        let covered_before = keys(&before.covered);
        let covered_after = keys(&after.covered);
        let missing_after = keys(&after.missing);

        Ok(Self {
            provenance: after.provenance,
            overall_before: before.overall_percentage,
            overall_after: after.overall_percentage,
            overall_delta: round1(after.overall_percentage - before.overall_percentage),
            categories,
            newly_covered: covered_after.difference(&covered_before).cloned().collect(),
            newly_missing: covered_before.intersection(&missing_after).cloned().collect(),
        })
    }
}
