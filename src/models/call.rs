use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::endpoint::EndpointDescriptor;
use super::response::ApiResponse;
use crate::error::{ErrorKind, HarnessError};

/// One logical request: the endpoint to hit plus whatever it carries.
///
/// Deserializes from a plan entry such as
/// `{"method": "GET", "path": "/domains/42", "category": "domains"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCall {
    #[serde(flatten)]
    pub endpoint: EndpointDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ApiCall {
    pub fn new(endpoint: EndpointDescriptor) -> Self {
        Self {
            endpoint,
            body: None,
            headers: BTreeMap::new(),
            timeout_ms: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Breaker key. Uncategorized endpoints share one circuit.
    pub fn category(&self) -> &str {
        if self.endpoint.category.is_empty() {
            "uncategorized"
        } else {
            &self.endpoint.category
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&HarnessError> for AttemptError {
    fn from(err: &HarnessError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAttempt {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: Option<u16>,
    pub error: Option<AttemptError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The transport delivered a final answer. The status may still be a 4xx.
    Success,
    ExhaustedRetries,
    CircuitOpenRejected,
    /// A transport failure the policy does not retry.
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ExhaustedRetries => "exhausted_retries",
            Outcome::CircuitOpenRejected => "circuit_open_rejected",
            Outcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub endpoint: EndpointDescriptor,
    pub attempts: Vec<CallAttempt>,
    pub outcome: Outcome,
    /// Response of the last attempt, if it produced one.
    pub response: Option<ApiResponse>,
}

impl CallRecord {
    pub fn rejected(endpoint: EndpointDescriptor) -> Self {
        Self {
            endpoint,
            attempts: Vec::new(),
            outcome: Outcome::CircuitOpenRejected,
            response: None,
        }
    }

    pub fn final_status(&self) -> Option<u16> {
        self.attempts.last().and_then(|attempt| attempt.status)
    }

    pub fn last_error(&self) -> Option<&AttemptError> {
        self.attempts.last().and_then(|attempt| attempt.error.as_ref())
    }

    /// True when the dependency itself looked unhealthy. Feeds the circuit breaker.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self.outcome, Outcome::ExhaustedRetries | Outcome::Failed)
    }

    pub fn saw_rate_limit(&self) -> bool {
        self.attempts.iter().any(|attempt| attempt.status == Some(429))
    }

    /// Whether any attempt got an HTTP answer from the server.
    pub fn reached_server(&self) -> bool {
        self.attempts.iter().any(|attempt| attempt.status.is_some())
    }
}
