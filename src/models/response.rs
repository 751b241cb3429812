use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A normalized HTTP response. Header names are lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
    pub duration_ms: u64,
}

/// The vendor's JSON body shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<'a> {
    Data(&'a Value),
    Results(&'a Value),
    Detail(&'a str),
    Errors(&'a [Value]),
    Other(&'a Value),
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn envelope(&self) -> Envelope<'_> {
        if let Some(data) = self.body.get("data") {
            return Envelope::Data(data);
        }
        if let Some(results) = self.body.get("results") {
            return Envelope::Results(results);
        }
        if let Some(detail) = self.body.get("detail").and_then(Value::as_str) {
            return Envelope::Detail(detail);
        }
        if let Some(errors) = self.body.get("errors").and_then(Value::as_array) {
            return Envelope::Errors(errors);
        }
        Envelope::Other(&self.body)
    }
}
