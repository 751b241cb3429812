use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::delta::category_of;
use crate::models::CallRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub calls: usize,
    pub passed: usize,
    pub pass_rate: f64,
}

/// Pass rates of one batch run. A call passes when its final status is 2xx.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_calls: usize,
    pub total_attempts: usize,
    pub passed: usize,
    /// `None` for an empty batch.
    pub pass_rate: Option<f64>,
    pub by_outcome: BTreeMap<String, usize>,
    pub by_status_class: BTreeMap<String, usize>,
    pub categories: BTreeMap<String, CategorySummary>,
}

fn status_class(status: Option<u16>) -> String {
    match status {
        Some(status) => format!("{}xx", status / 100),
        None => "none".to_string(),
    }
}

fn rate(passed: usize, calls: usize) -> f64 {
    if calls == 0 {
        return 0.0;
    }
    (passed as f64 * 1000.0 / calls as f64).round() / 10.0
}

impl BatchSummary {
    pub fn from_records(records: &[CallRecord]) -> Self {
        let mut by_outcome = BTreeMap::new();
        let mut by_status_class = BTreeMap::new();
        let mut categories: BTreeMap<String, CategorySummary> = BTreeMap::new();
        let mut passed = 0;

        for record in records {
            let status = record.final_status();
            let ok = status.is_some_and(|s| (200..300).contains(&s));

            *by_outcome.entry(record.outcome.as_str().to_string()).or_insert(0) += 1;
            *by_status_class.entry(status_class(status)).or_insert(0) += 1;

            let category = categories
                .entry(category_of(&record.endpoint).to_string())
                .or_insert(CategorySummary {
                    calls: 0,
                    passed: 0,
                    pass_rate: 0.0,
                });
            category.calls += 1;
            if ok {
                category.passed += 1;
                passed += 1;
            }
        }

        for category in categories.values_mut() {
            category.pass_rate = rate(category.passed, category.calls);
        }

        Self {
            total_calls: records.len(),
            total_attempts: records.iter().map(|r| r.attempts.len()).sum(),
            passed,
            pass_rate: (!records.is_empty()).then(|| rate(passed, records.len())),
            by_outcome,
            by_status_class,
            categories,
        }
    }
}
