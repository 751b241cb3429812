use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use super::call::CallRecord;
use super::endpoint::EndpointDescriptor;
use crate::error::{HarnessError, Result};

/// Where an inventory's data came from. Simulated data is never mixed with observed data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Observed,
    Simulated,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Observed => f.write_str("observed"),
            Provenance::Simulated => f.write_str("simulated"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    pub endpoints: Vec<EndpointDescriptor>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InventoryFile {
    Tagged(Inventory),
    Bare(Vec<EndpointDescriptor>),
}

impl Inventory {
    pub fn new(provenance: Provenance, endpoints: Vec<EndpointDescriptor>) -> Self {
        Self {
            provenance,
            generated_at: Some(Utc::now()),
            endpoints,
        }
    }

    /// Parses either a tagged inventory object or a bare endpoint list (treated as observed).
    pub fn from_json(json: &str) -> Result<Self> {
        let file: InventoryFile = serde_json::from_str(json)?;
        Ok(match file {
            InventoryFile::Tagged(inventory) => inventory,
            InventoryFile::Bare(endpoints) => Self {
                provenance: Provenance::Observed,
                generated_at: None,
                endpoints,
            },
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Endpoints that actually reached the server during a run.
    ///
    /// Circuit rejections and connection failures do not count as coverage.
    pub fn observed_from_records(records: &[CallRecord]) -> Self {
        let mut seen = HashSet::new();
        let endpoints = records
            .iter()
            .filter(|record| record.reached_server())
            .filter(|record| seen.insert(record.endpoint.key()))
            .map(|record| record.endpoint.clone())
            .collect();

        Self::new(Provenance::Observed, endpoints)
    }

    /// Appends `other`, dropping duplicate identities. Fails if provenances differ.
    pub fn merge(&mut self, other: Inventory) -> Result<()> {
        if self.provenance != other.provenance {
            return Err(HarnessError::ProvenanceMismatch {
                left: self.provenance.to_string(),
                right: other.provenance.to_string(),
            });
        }

        let mut seen: HashSet<_> = self.endpoints.iter().map(EndpointDescriptor::key).collect();
        for endpoint in other.endpoints {
            if seen.insert(endpoint.key()) {
                self.endpoints.push(endpoint);
            }
        }
        Ok(())
    }
}
